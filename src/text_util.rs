/// Page boundary marker written between the pages of extracted PDF text.
pub const PAGE_BREAK: char = '\u{c}';

/// Maximum number of characters kept per context line.
pub const DEFAULT_SNIPPET_MAX_CHARS: usize = 400;

/// Byte ranges `[start, end)` of every `\n`-terminated line in `text`,
/// terminators excluded.
///
/// A terminator at the very end of the text does not open an extra empty
/// line, and empty text has no lines at all. Form feeds are ordinary
/// characters here; see [`page_line_spans`] for PDF text.
pub fn line_spans(text: &str) -> Vec<(usize, usize)> {
    spans_ending_at(text, |byte| byte == b'\n')
}

/// Like [`line_spans`], but [`PAGE_BREAK`] also ends a line, so each PDF
/// page starts on a fresh line.
pub fn page_line_spans(text: &str) -> Vec<(usize, usize)> {
    spans_ending_at(text, |byte| byte == b'\n' || byte == PAGE_BREAK as u8)
}

fn spans_ending_at(
    text: &str,
    is_terminator: impl Fn(u8) -> bool,
) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;

    for (idx, byte) in text.bytes().enumerate() {
        if is_terminator(byte) {
            spans.push((start, idx));
            start = idx + 1;
        }
    }
    if start < text.len() {
        spans.push((start, text.len()));
    }

    spans
}

/// Cut `text` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Prepend line numbers to each line of text.
///
/// `start_line` is the number to assign to the first line (1-indexed).
pub fn add_line_numbers(text: &str, start_line: usize) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| format!("{}: {}", start_line + i, line))
        .collect::<Vec<_>>()
        .join("\n")
}
