use super::{FIELDS, InvoiceRecord};
use serde::Deserialize;

/// How a reply line is matched against field names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// A field matches any line containing its name. The value is whatever
    /// follows the line's last `:`. One line may fill several fields.
    #[default]
    Substring,
    /// A field matches only a `Name: value` line whose key, minus markdown
    /// decoration, equals the name (ASCII case-insensitive).
    Anchored,
}

/// Characters stripped around an anchored key, e.g. `- **PO Number**`.
const KEY_DECORATIONS: &[char] = &['*', '-', '#', '"', '•'];

/// Parse a model reply into an [`InvoiceRecord`] using substring matching.
pub fn extract_fields(response: &str) -> InvoiceRecord {
    extract_fields_with(response, MatchMode::Substring)
}

pub fn extract_fields_with(response: &str, mode: MatchMode) -> InvoiceRecord {
    let mut record = InvoiceRecord::new();

    for line in split_lines(response) {
        match mode {
            MatchMode::Substring => {
                for (index, field) in FIELDS.iter().enumerate() {
                    if line.contains(field.name) {
                        let raw = line.rsplit(':').next().unwrap_or(line);
                        record.set(index, sanitize_value(raw));
                    }
                }
            }
            MatchMode::Anchored => {
                if let Some((index, value)) = anchored_match(line) {
                    record.set(index, value);
                }
            }
        }
    }

    record
}

/// Trim surrounding whitespace, then drop every `"` and `,`.
pub fn sanitize_value(raw: &str) -> String {
    raw.trim_matches(is_space).replace(|c: char| c == '"' || c == ',', "")
}

/// Unicode whitespace plus the ASCII separators `\x1c`..=`\x1f`, which
/// also count as blank around a reply value.
fn is_space(c: char) -> bool {
    c.is_whitespace() || ('\x1c'..='\x1f').contains(&c)
}

fn anchored_match(line: &str) -> Option<(usize, String)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim_matches(|c: char| is_space(c) || KEY_DECORATIONS.contains(&c));
    let index = FIELDS
        .iter()
        .position(|f| f.name.eq_ignore_ascii_case(key))?;
    let value = value.trim_matches(|c: char| is_space(c) || c == '*');
    Some((index, sanitize_value(value)))
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

/// Split on every Unicode line boundary, treating `\r\n` as one break.
/// A trailing break does not produce an empty final line.
fn split_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_line_break(c) {
            continue;
        }
        lines.push(&text[start..i]);
        let mut end = i + c.len_utf8();
        if c == '\r' && matches!(chars.peek(), Some((_, '\n'))) {
            chars.next();
            end += 1;
        }
        start = end;
    }

    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}
