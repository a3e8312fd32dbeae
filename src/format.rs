//! The closed set of document formats and their text extraction.
//!
//! Every format turns raw file bytes into [`Extracted`] text plus a locator
//! table whose boundaries line up exactly with the extracted text: one
//! locator per line for text formats, one per page for PDF, one per
//! paragraph or table row for word-processor files.

use std::{borrow::Cow, io::Read, path::Path, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    document::{Locator, LocatorKind, line_locators},
    error::LoadError,
    text_util::PAGE_BREAK,
};

/// Extensions accepted by the loader, lowercase.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "txt", "md", "csv", "json", "xml", "log", "py", "java", "js", "ts",
    "html", "css", "yaml", "yml", "ini", "cfg", "conf", "err", "out", "sql",
    "sh", "bat", "ps1", "c", "cpp", "h", "pdf", "docx", "doc",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    Code,
    StructuredMarkup,
    PdfDocument,
    WordDocument,
}

/// Text pulled out of a file together with its locator table.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub text: String,
    pub locators: Vec<Locator>,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        let format = match ext.to_ascii_lowercase().as_str() {
            "txt" | "log" | "err" | "out" => Self::PlainText,
            "py" | "java" | "js" | "ts" | "c" | "cpp" | "h" | "sql" | "sh"
            | "bat" | "ps1" | "css" => Self::Code,
            "md" | "html" | "xml" | "json" | "yaml" | "yml" | "ini" | "cfg"
            | "conf" | "csv" => Self::StructuredMarkup,
            "pdf" => Self::PdfDocument,
            "docx" | "doc" => Self::WordDocument,
            _ => return None,
        };
        Some(format)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlainText => "text",
            Self::Code => "code",
            Self::StructuredMarkup => "markup",
            Self::PdfDocument => "pdf",
            Self::WordDocument => "word",
        }
    }

    /// Extract text and locators from the raw bytes of `path`.
    pub fn extract(
        self,
        path: &Path,
        bytes: &[u8],
    ) -> Result<Extracted, LoadError> {
        match self {
            Self::PlainText | Self::Code | Self::StructuredMarkup => {
                Ok(extract_plain(bytes))
            }
            Self::PdfDocument => extract_pdf(path, bytes),
            Self::WordDocument => extract_word(path, bytes),
        }
    }
}

fn extract_plain(bytes: &[u8]) -> Extracted {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = String::from_utf8_lossy(bytes).into_owned();
    let locators = line_locators(&text);
    Extracted { text, locators }
}

// -- PDF --

fn extract_pdf(path: &Path, bytes: &[u8]) -> Result<Extracted, LoadError> {
    let pdf =
        lopdf::Document::load_mem(bytes).map_err(|e| LoadError::Pdf {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let pages: Vec<String> = pdf
        .get_pages()
        .keys()
        .map(|&number| {
            pdf.extract_text(&[number]).unwrap_or_else(|e| {
                debug!(path = %path.display(), page = number, error = %e, "page has no extractable text");
                String::new()
            })
        })
        .collect();

    Ok(assemble_pages(&pages))
}

/// Join page texts with [`PAGE_BREAK`] and emit one `page N` locator at the
/// start of each page.
pub(crate) fn assemble_pages(pages: &[String]) -> Extracted {
    let mut text = String::new();
    let mut locators = Vec::with_capacity(pages.len().max(1));

    for (idx, page) in pages.iter().enumerate() {
        if idx > 0 {
            text.push(PAGE_BREAK);
        }
        locators.push(Locator::new(
            text.len(),
            LocatorKind::Page,
            number(idx),
        ));
        text.push_str(&page.trim_end().replace(PAGE_BREAK, "\n"));
    }
    if locators.is_empty() {
        locators.push(Locator::new(0, LocatorKind::Page, 1));
    }

    Extracted { text, locators }
}

// -- Word processor --

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Paragraph(String),
    TableRow { table: u32, text: String },
}

static WORD_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(/?)w:(p|tbl|tr|tc|tab|br|cr|t)(?:\s[^>]*?)?(/?)>")
        .expect("word tag pattern is valid")
});

/// Signature of the pre-2007 binary (OLE compound file) Word format.
const OLE_MAGIC: &[u8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

fn extract_word(path: &Path, bytes: &[u8]) -> Result<Extracted, LoadError> {
    if bytes.starts_with(OLE_MAGIC) {
        return Err(LoadError::Unsupported {
            path: path.to_path_buf(),
        });
    }
    let word_error = |message: String| LoadError::Word {
        path: path.to_path_buf(),
        message,
    };

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| word_error(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| word_error(e.to_string()))?
        .read_to_string(&mut xml)
        .map_err(|e| word_error(e.to_string()))?;

    Ok(assemble_blocks(&word_blocks(&xml)))
}

/// Row and cell being collected for one open table.
#[derive(Debug, Default)]
struct TableFrame {
    row: Vec<String>,
    cell: String,
}

impl TableFrame {
    fn push_text(&mut self, text: &str) {
        if !self.cell.is_empty() {
            self.cell.push(' ');
        }
        self.cell.push_str(text);
    }
}

/// Walk the body of `word/document.xml` in document order, producing one
/// block per non-empty paragraph and one per non-empty top-level table
/// row. A table nested in a cell is folded into that cell's text.
fn word_blocks(xml: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph = String::new();
    let mut text_start: Option<usize> = None;
    let mut frames: Vec<TableFrame> = Vec::new();
    let mut tables = 0u32;

    for caps in WORD_TAG.captures_iter(xml) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let self_closing = caps.get(3).is_some_and(|m| !m.as_str().is_empty());
        let name = caps.get(2).map_or("", |m| m.as_str());

        match (name, closing) {
            ("t", false) if !self_closing => text_start = Some(whole.end()),
            ("t", true) => {
                if let Some(start) = text_start.take() {
                    paragraph.push_str(&unescape_xml(&xml[start..whole.start()]));
                }
            }
            ("tab", false) => paragraph.push('\t'),
            ("br" | "cr", false) => paragraph.push(' '),
            ("p", true) => {
                let text = clean_block(&std::mem::take(&mut paragraph));
                if text.is_empty() {
                    continue;
                }
                match frames.last_mut() {
                    Some(frame) => frame.push_text(&text),
                    None => blocks.push(Block::Paragraph(text)),
                }
            }
            ("tbl", false) if !self_closing => {
                if frames.is_empty() {
                    tables += 1;
                }
                frames.push(TableFrame::default());
            }
            ("tbl", true) => {
                frames.pop();
            }
            ("tr", false) => {
                if let Some(frame) = frames.last_mut() {
                    frame.row.clear();
                }
            }
            ("tr", true) => {
                let Some(frame) = frames.last_mut() else {
                    continue;
                };
                let cells: Vec<String> =
                    frame.row.drain(..).filter(|c| !c.is_empty()).collect();
                if cells.is_empty() {
                    continue;
                }
                let text = cells.join(" | ");
                match frames.len().checked_sub(2) {
                    Some(outer) => frames[outer].push_text(&text),
                    None => blocks.push(Block::TableRow {
                        table: tables,
                        text,
                    }),
                }
            }
            ("tc", false) => {
                if let Some(frame) = frames.last_mut() {
                    frame.cell.clear();
                }
            }
            ("tc", true) => {
                if let Some(frame) = frames.last_mut() {
                    let cell = std::mem::take(&mut frame.cell);
                    frame.row.push(cell);
                }
            }
            _ => {}
        }
    }

    blocks
}

fn assemble_blocks(blocks: &[Block]) -> Extracted {
    let mut text = String::new();
    let mut locators = Vec::with_capacity(blocks.len().max(1));
    let mut paragraphs = 0usize;

    for (idx, block) in blocks.iter().enumerate() {
        if idx > 0 {
            text.push('\n');
        }
        let (locator, body) = match block {
            Block::Paragraph(body) => {
                paragraphs += 1;
                let locator = Locator::new(
                    text.len(),
                    LocatorKind::Paragraph,
                    number(paragraphs - 1),
                );
                (locator, body)
            }
            Block::TableRow { table, text: body } => {
                (Locator::new(text.len(), LocatorKind::Table, *table), body)
            }
        };
        locators.push(locator);
        text.push_str(body);
    }
    if locators.is_empty() {
        locators.push(Locator::new(0, LocatorKind::Paragraph, 1));
    }

    Extracted { text, locators }
}

/// Collapse line and page terminators so a block stays on one line.
fn clean_block(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '\n' || c == '\r' || c == PAGE_BREAK { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

fn unescape_xml(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest.find(';').and_then(|semi| {
            let entity = &rest[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| {
                        entity.strip_prefix('#').and_then(|d| d.parse().ok())
                    })
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn number(idx: usize) -> u32 {
    u32::try_from(idx + 1).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::text_util::page_line_spans;

    fn docx_bytes(body: &str) -> Vec<u8> {
        let xml = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
             <w:body>{body}</w:body></w:document>"
        );
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn para(text: &str) -> String {
        format!("<w:p><w:pPr><w:pStyle w:val=\"Normal\"/></w:pPr><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>")
    }

    fn labels(extracted: &Extracted) -> Vec<String> {
        extracted.locators.iter().map(Locator::label).collect()
    }

    #[test]
    fn whitelist_has_every_extension_mapped() {
        assert_eq!(SUPPORTED_EXTENSIONS.len(), 29);
        for ext in SUPPORTED_EXTENSIONS {
            assert!(
                DocumentFormat::from_extension(ext).is_some(),
                "{ext} has no format"
            );
        }
        assert_eq!(DocumentFormat::from_extension("png"), None);
    }

    #[test]
    fn formats_by_family() {
        let of = |p: &str| DocumentFormat::from_path(Path::new(p));
        assert_eq!(of("a.log"), Some(DocumentFormat::PlainText));
        assert_eq!(of("a.PS1"), Some(DocumentFormat::Code));
        assert_eq!(of("a.yaml"), Some(DocumentFormat::StructuredMarkup));
        assert_eq!(of("a.pdf"), Some(DocumentFormat::PdfDocument));
        assert_eq!(of("a.doc"), Some(DocumentFormat::WordDocument));
        assert_eq!(of("Makefile"), None);
    }

    #[test]
    fn plain_text_gets_line_locators() {
        let extracted = DocumentFormat::PlainText
            .extract(Path::new("a.txt"), b"\xEF\xBB\xBFfirst\nsecond\n")
            .unwrap();
        assert_eq!(extracted.text, "first\nsecond\n");
        assert_eq!(labels(&extracted), vec!["line 1", "line 2"]);
        assert_eq!(extracted.locators[1].offset, 6);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let extracted = DocumentFormat::Code
            .extract(Path::new("a.c"), b"int x;\xff\n")
            .unwrap();
        assert!(extracted.text.starts_with("int x;"));
    }

    #[test]
    fn pages_are_separated_by_marker() {
        let extracted = assemble_pages(&[
            "Intro\n".to_string(),
            "Body line\nmore".to_string(),
            String::new(),
        ]);
        assert_eq!(extracted.text, "Intro\u{c}Body line\nmore\u{c}");
        assert_eq!(labels(&extracted), vec!["page 1", "page 2", "page 3"]);
        assert_eq!(extracted.locators[1].offset, 6);
        assert_eq!(extracted.locators[2].offset, 21);
        assert_eq!(page_line_spans(&extracted.text)[1], (6, 15));
    }

    #[test]
    fn corrupt_pdf_is_a_load_error() {
        let err = DocumentFormat::PdfDocument
            .extract(Path::new("broken.pdf"), b"not a pdf at all")
            .unwrap_err();
        assert!(matches!(err, LoadError::Pdf { .. }));
    }

    #[test]
    fn legacy_doc_is_unsupported() {
        let err = DocumentFormat::WordDocument
            .extract(
                Path::new("old.doc"),
                b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1 binary",
            )
            .unwrap_err();
        assert!(matches!(err, LoadError::Unsupported { .. }));
    }

    #[test]
    fn broken_word_archive_is_a_load_error() {
        let err = DocumentFormat::WordDocument
            .extract(Path::new("bad.docx"), b"PK not really a zip")
            .unwrap_err();
        assert!(matches!(err, LoadError::Word { .. }));
    }

    #[test]
    fn docx_paragraphs_are_numbered_skipping_empty_ones() {
        let body = format!(
            "{}<w:p/>{}<w:p><w:r><w:t></w:t></w:r></w:p>{}",
            para("First &amp; foremost"),
            para("Second"),
            para("Third")
        );
        let extracted = DocumentFormat::WordDocument
            .extract(Path::new("a.docx"), &docx_bytes(&body))
            .unwrap();
        assert_eq!(extracted.text, "First & foremost\nSecond\nThird");
        assert_eq!(
            labels(&extracted),
            vec!["paragraph 1", "paragraph 2", "paragraph 3"]
        );
    }

    #[test]
    fn docx_tables_become_pipe_rows() {
        let row = |a: &str, b: &str| {
            format!(
                "<w:tr><w:trPr/><w:tc><w:tcPr/>{}</w:tc><w:tc>{}</w:tc></w:tr>",
                para(a),
                para(b)
            )
        };
        let body = format!(
            "{}<w:tbl><w:tblPr/>{}{}</w:tbl>{}",
            para("Before"),
            row("Name", "Value"),
            row("HABITAT", "failed"),
            para("After")
        );
        let extracted = DocumentFormat::WordDocument
            .extract(Path::new("a.docx"), &docx_bytes(&body))
            .unwrap();
        assert_eq!(
            extracted.text,
            "Before\nName | Value\nHABITAT | failed\nAfter"
        );
        assert_eq!(
            labels(&extracted),
            vec!["paragraph 1", "table 1", "table 1", "paragraph 2"]
        );
    }

    #[test]
    fn docx_nested_table_stays_inside_its_cell() {
        let inner = format!(
            "<w:tbl><w:tr><w:tc>{}</w:tc><w:tc>{}</w:tc></w:tr></w:tbl>",
            para("inner"),
            para("deeper")
        );
        let body = format!(
            "<w:tbl><w:tr><w:tc>{}</w:tc><w:tc>{}{inner}</w:tc><w:tc>{}</w:tc></w:tr>\
             <w:tr><w:tc>{}</w:tc></w:tr></w:tbl>{}",
            para("OuterA"),
            para("lead"),
            para("OuterB"),
            para("second row"),
            para("After")
        );
        let extracted = DocumentFormat::WordDocument
            .extract(Path::new("a.docx"), &docx_bytes(&body))
            .unwrap();
        assert_eq!(
            extracted.text,
            "OuterA | lead inner | deeper | OuterB\nsecond row\nAfter"
        );
        assert_eq!(labels(&extracted), vec!["table 1", "table 1", "paragraph 1"]);
    }

    /// A PDF with one text line per page, Courier, WinAnsi encoded.
    fn pdf_bytes(pages: &[&str]) -> Vec<u8> {
        use lopdf::{
            Object,
            Stream,
            content::{Content, Operation},
            dictionary,
        };

        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let kids: Vec<Object> = pages
            .iter()
            .map(|line| {
                let content = Content {
                    operations: vec![
                        Operation::new("BT", vec![]),
                        Operation::new("Tf", vec!["F1".into(), 12.into()]),
                        Operation::new("Td", vec![72.into(), 720.into()]),
                        Operation::new("Tj", vec![Object::string_literal(*line)]),
                        Operation::new("ET", vec![]),
                    ],
                };
                let content_id = doc.add_object(Stream::new(
                    dictionary! {},
                    content.encode().unwrap(),
                ));
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "Contents" => content_id,
                })
                .into()
            })
            .collect();

        let count = i64::try_from(kids.len()).unwrap();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn pdf_pages_are_extracted_and_located() {
        let bytes = pdf_bytes(&["Station overview", "coolant pump replaced"]);
        let extracted = DocumentFormat::PdfDocument
            .extract(Path::new("report.pdf"), &bytes)
            .unwrap();
        assert_eq!(labels(&extracted), vec!["page 1", "page 2"]);
        assert!(extracted.text.contains(PAGE_BREAK));
        assert!(extracted.text.contains("Station overview"));

        let doc = crate::document::Document {
            id: "report.pdf".to_string(),
            path: Path::new("report.pdf").to_path_buf(),
            format: DocumentFormat::PdfDocument,
            raw_text: extracted.text,
            locators: extracted.locators,
        };
        assert!(doc.check_locators().is_ok());
        let pattern = crate::exact::TolerantPattern::new("coolant-pump").unwrap();
        let found = crate::exact::search_document(&doc, &pattern, 2);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].locator_label, "page 2");
    }

    #[test]
    fn docx_tabs_and_breaks_stay_on_one_line() {
        let body = "<w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>c</w:t></w:r></w:p>";
        let extracted = DocumentFormat::WordDocument
            .extract(Path::new("a.docx"), &docx_bytes(body))
            .unwrap();
        assert_eq!(extracted.text, "a\tb c");
    }

    #[test]
    fn unescape_handles_numeric_and_unknown_entities() {
        assert_eq!(unescape_xml("a&#65;&#x42;&bogus;"), "aAB&bogus;");
        assert_eq!(unescape_xml("1 &lt; 2 &gt; 0"), "1 < 2 > 0");
        assert_eq!(unescape_xml("dangling &"), "dangling &");
    }
}
