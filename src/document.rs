//! Documents and their offset → locator tables.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    format::DocumentFormat,
    text_util::{line_spans, page_line_spans},
};

/// The unit a locator counts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorKind {
    Line,
    Page,
    Paragraph,
    Table,
}

impl LocatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Page => "page",
            Self::Paragraph => "paragraph",
            Self::Table => "table",
        }
    }
}

/// A human-meaningful position that starts at `offset` (a byte offset into
/// the document's raw text) and extends to the next locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub offset: usize,
    pub kind: LocatorKind,
    pub number: u32,
}

impl Locator {
    pub fn new(offset: usize, kind: LocatorKind, number: u32) -> Self {
        Self {
            offset,
            kind,
            number,
        }
    }

    /// Display label such as `line 10` or `page 3`.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.number)
    }
}

/// One loaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier: the path relative to the indexed root.
    pub id: String,
    /// Absolute path the text was read from.
    pub path: PathBuf,
    pub format: DocumentFormat,
    pub raw_text: String,
    /// Strictly increasing by offset; the first one starts at 0.
    pub locators: Vec<Locator>,
}

impl Document {
    /// Line spans of the raw text. Only PDF text treats the page marker as
    /// a line break; in every other format a form feed is ordinary text.
    pub fn line_spans(&self) -> Vec<(usize, usize)> {
        match self.format {
            DocumentFormat::PdfDocument => page_line_spans(&self.raw_text),
            _ => line_spans(&self.raw_text),
        }
    }

    /// Resolve the locator covering `offset` (nearest preceding boundary).
    pub fn locate(&self, offset: usize) -> Option<&Locator> {
        let idx = self.locators.partition_point(|l| l.offset <= offset);
        idx.checked_sub(1).map(|i| &self.locators[i])
    }

    /// Check the locator table invariants, returning a description of the
    /// first violation.
    pub fn check_locators(&self) -> Result<(), String> {
        let Some(first) = self.locators.first() else {
            return Err(format!("document {} has no locators", self.id));
        };
        if first.offset != 0 {
            return Err(format!(
                "document {} locators start at {} instead of 0",
                self.id, first.offset
            ));
        }
        for pair in self.locators.windows(2) {
            if pair[1].offset <= pair[0].offset {
                return Err(format!(
                    "document {} locators are not strictly increasing",
                    self.id
                ));
            }
        }
        if self
            .locators
            .last()
            .is_some_and(|l| l.offset > self.raw_text.len())
        {
            return Err(format!(
                "document {} has a locator past the end of its text",
                self.id
            ));
        }
        Ok(())
    }
}

/// One `line N` locator per line of `text`, or a single `line 1` at offset 0
/// for empty text.
pub fn line_locators(text: &str) -> Vec<Locator> {
    let mut locators: Vec<Locator> = line_spans(text)
        .into_iter()
        .enumerate()
        .map(|(i, (start, _))| {
            Locator::new(start, LocatorKind::Line, line_number(i))
        })
        .collect();
    if locators.is_empty() {
        locators.push(Locator::new(0, LocatorKind::Line, 1));
    }
    locators
}

fn line_number(idx: usize) -> u32 {
    u32::try_from(idx + 1).unwrap_or(u32::MAX)
}
