//! Exact search: separator-tolerant literal matching over raw document text
//! with line context around each hit.

use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{
    document::Document,
    error::QueryError,
    generation::IndexGeneration,
    text_util::{DEFAULT_SNIPPET_MAX_CHARS, truncate_chars},
};

/// Minimum number of context lines per result, counting the match line.
pub const MIN_CONTEXT_LINES: usize = 2;

/// One exact-search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub document_id: String,
    /// Label of the nearest preceding locator, e.g. `line 10` or `page 2`.
    pub locator_label: String,
    /// 1-based position in the full result sequence.
    pub rank: usize,
    /// 1-based line of the match within the document's extracted text.
    pub line: usize,
    /// Byte offset of the match within the document's extracted text.
    pub offset: usize,
    /// The text that matched, as it appears in the document.
    pub matched_snippet: String,
    /// The match line followed by the next lines of the document.
    pub context_lines: Vec<String>,
}

/// A query compiled into a literal pattern in which separators are
/// optional: `bow-tie`, `bow tie` and `bowtie` all match each other.
#[derive(Debug, Clone)]
pub struct TolerantPattern {
    regex: Regex,
}

impl TolerantPattern {
    pub fn new(query: &str) -> Result<Self, QueryError> {
        let chars: Vec<String> = query
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .map(|c| regex::escape(c.encode_utf8(&mut [0; 4])))
            .collect();
        if chars.is_empty() {
            return Err(QueryError::Empty);
        }

        let regex = RegexBuilder::new(&chars.join(r"[-\s]?"))
            .case_insensitive(true)
            .build()
            .map_err(|e| QueryError::Pattern(e.to_string()))?;
        Ok(Self { regex })
    }

    /// Byte range of the first match in `haystack`.
    pub fn find(&self, haystack: &str) -> Option<(usize, usize)> {
        self.regex.find(haystack).map(|m| (m.start(), m.end()))
    }
}

/// Scan every document of `generation` for `query`.
///
/// Results come in document load order, and by ascending offset within a
/// document. Each line contributes at most one result.
pub fn search(
    generation: &IndexGeneration,
    query: &str,
    context_lines: usize,
) -> Result<Vec<QueryResult>, QueryError> {
    let pattern = TolerantPattern::new(query)?;
    let context_lines = context_lines.max(MIN_CONTEXT_LINES);

    let per_document: Vec<Vec<QueryResult>> = generation
        .documents()
        .par_iter()
        .map(|doc| search_document(doc, &pattern, context_lines))
        .collect();

    let mut results: Vec<QueryResult> =
        per_document.into_iter().flatten().collect();
    for (pos, result) in results.iter_mut().enumerate() {
        result.rank = pos + 1;
    }
    Ok(results)
}

/// All hits in one document, unranked.
pub fn search_document(
    doc: &Document,
    pattern: &TolerantPattern,
    context_lines: usize,
) -> Vec<QueryResult> {
    let text = doc.raw_text.as_str();
    let spans = doc.line_spans();
    let mut results = Vec::new();

    for (idx, &(start, end)) in spans.iter().enumerate() {
        let Some((m_start, m_end)) = pattern.find(&text[start..end]) else {
            continue;
        };
        let offset = start + m_start;
        let locator_label = doc
            .locate(offset)
            .map(|l| l.label())
            .unwrap_or_else(|| format!("line {}", idx + 1));
        let window_end = (idx + context_lines).min(spans.len());
        let context = spans[idx..window_end]
            .iter()
            .map(|&(s, e)| {
                truncate_chars(text[s..e].trim_end(), DEFAULT_SNIPPET_MAX_CHARS)
            })
            .collect();

        results.push(QueryResult {
            document_id: doc.id.clone(),
            locator_label,
            rank: 0,
            line: idx + 1,
            offset,
            matched_snippet: text[offset..start + m_end].to_string(),
            context_lines: context,
        });
    }

    results
}
