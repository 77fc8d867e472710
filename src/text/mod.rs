//! Text coordinate service: byte offset ⇄ (line, character) conversion
//! plus the small amount of lexical scanning the query layer needs.
//!
//! All functions here are pure; any caching of file content belongs to
//! the callers. Lines and characters are 0-based, characters are byte
//! columns. The extractor emits byte offsets, so the conversions below
//! are exact as long as positions stay on byte boundaries.

use crate::models::{TextEdit, TextPosition, TextRange};

/// Convert a byte offset into a (line, character) position.
///
/// Offsets past the end of `content` are clamped to the end.
pub fn position_of(content: &str, offset: usize) -> TextPosition {
    let clamped = offset.min(content.len());
    let prefix = &content.as_bytes()[..clamped];

    let line = prefix.iter().filter(|&&b| b == b'\n').count() as u32;
    let line_start = prefix
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);

    TextPosition::new(line, (clamped - line_start) as u32)
}

/// Convert a (line, character) position into a byte offset.
///
/// Returns `None` when the line does not exist or the character runs
/// past the end of the line (one past the last byte is still valid).
/// Callers log and drop the record rather than guessing.
pub fn offset_of(content: &str, position: TextPosition) -> Option<usize> {
    let mut line_start = 0usize;
    for _ in 0..position.line {
        let rel = content[line_start..].find('\n')?;
        line_start += rel + 1;
    }

    let line_end = content[line_start..]
        .find('\n')
        .map(|rel| line_start + rel)
        .unwrap_or(content.len());

    let offset = line_start + position.character as usize;
    (offset <= line_end).then_some(offset)
}

/// Slice the text covered by a range, if both endpoints resolve.
pub fn slice_range(content: &str, range: TextRange) -> Option<&str> {
    let start = offset_of(content, range.start)?;
    let end = offset_of(content, range.end)?;
    (start <= end).then(|| &content[start..end])
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Walk backwards from `offset` to the start of the identifier the
/// cursor is sitting in (or immediately after). Returns `offset` itself
/// when no identifier byte precedes it.
pub fn word_start(content: &str, offset: usize) -> usize {
    let bytes = content.as_bytes();
    let mut start = offset.min(bytes.len());
    while start > 0 && is_ident_byte(bytes[start - 1]) {
        start -= 1;
    }
    start
}

/// True for a simple (non-escaped) SystemVerilog identifier:
/// `[a-zA-Z_][a-zA-Z0-9_$]*`.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(is_ident_byte)
}

/// Apply a rename edit plan to file content.
///
/// Edits are applied from the end of the file towards the start so that
/// earlier offsets stay valid. Edits whose ranges no longer resolve
/// against `content` are skipped.
pub fn apply_edits(content: &str, edits: &[TextEdit]) -> String {
    let mut resolved: Vec<(usize, usize, &str)> = edits
        .iter()
        .filter_map(|edit| {
            let start = offset_of(content, edit.range.start)?;
            let end = offset_of(content, edit.range.end)?;
            (start <= end).then_some((start, end, edit.new_text.as_str()))
        })
        .collect();
    resolved.sort_by_key(|&(start, _, _)| std::cmp::Reverse(start));

    let mut result = content.to_string();
    for (start, end, new_text) in resolved {
        result.replace_range(start..end, new_text);
    }
    result
}
