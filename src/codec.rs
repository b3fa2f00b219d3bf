//! Line codec
//!
//! Escaping shared by the SSTable and WAL file formats. Both formats are
//! line-oriented with comma-separated fields, so every byte that could be
//! mistaken for structure is escaped with a backslash.
//!
//! ## Escapes
//! ```text
//! ┌──────────┬──────────┐
//! │ Raw byte │ Written  │
//! ├──────────┼──────────┤
//! │ \        │ \\       │
//! │ ,        │ \,       │
//! │ LF       │ \n       │
//! │ CR       │ \r       │
//! └──────────┴──────────┘
//! ```
//!
//! `\_` decodes to `_`. It only appears in front of an SSTable value that is
//! byte-for-byte equal to the tombstone sentinel, so the two stay distinct.

/// Field separator inside a record line
pub const FIELD_SEPARATOR: u8 = b',';

/// Record terminator
pub const LINE_TERMINATOR: u8 = b'\n';

const ESCAPE: u8 = b'\\';

/// Escape a key or value so it can be embedded in a record line
pub fn escape(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + 2);
    for &byte in raw {
        match byte {
            ESCAPE => out.extend_from_slice(b"\\\\"),
            FIELD_SEPARATOR => out.extend_from_slice(b"\\,"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse `escape`. Returns a reason string on a malformed escape.
pub fn unescape(field: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(field.len());
    let mut bytes = field.iter();

    while let Some(&byte) = bytes.next() {
        if byte != ESCAPE {
            out.push(byte);
            continue;
        }

        match bytes.next() {
            Some(b'\\') => out.push(ESCAPE),
            Some(b',') => out.push(FIELD_SEPARATOR),
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b'_') => out.push(b'_'),
            Some(other) => return Err(format!("unknown escape sequence \\{}", *other as char)),
            None => return Err("dangling escape at end of field".to_string()),
        }
    }

    Ok(out)
}

/// Split a record line on separators that are not escaped.
///
/// At most `max_fields` fields are produced; the last one keeps any
/// remaining separators verbatim. Fields are returned still escaped.
pub fn split_fields(line: &[u8], max_fields: usize) -> Vec<&[u8]> {
    let mut fields = Vec::with_capacity(max_fields);
    let mut start = 0;
    let mut escaped = false;

    for (i, &byte) in line.iter().enumerate() {
        if fields.len() + 1 == max_fields {
            break;
        }
        if escaped {
            escaped = false;
        } else if byte == ESCAPE {
            escaped = true;
        } else if byte == FIELD_SEPARATOR {
            fields.push(&line[start..i]);
            start = i + 1;
        }
    }

    fields.push(&line[start..]);
    fields
}
