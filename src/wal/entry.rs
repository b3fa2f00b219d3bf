//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their line form.

use crate::codec::{self, FIELD_SEPARATOR, LINE_TERMINATOR};

const PUT_TAG: &[u8] = b"PUT";
const DELETE_TAG: &[u8] = b"DELETE";

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalEntry {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl WalEntry {
    pub fn put(key: &[u8], value: &[u8]) -> Self {
        WalEntry::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    pub fn delete(key: &[u8]) -> Self {
        WalEntry::Delete { key: key.to_vec() }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            WalEntry::Put { key, .. } | WalEntry::Delete { key } => key,
        }
    }

    /// Encode as `PUT,<key>,<value>\n` or `DELETE,<key>\n`
    pub fn encode(&self) -> Vec<u8> {
        let mut line = Vec::new();
        match self {
            WalEntry::Put { key, value } => {
                line.extend_from_slice(PUT_TAG);
                line.push(FIELD_SEPARATOR);
                line.extend_from_slice(&codec::escape(key));
                line.push(FIELD_SEPARATOR);
                line.extend_from_slice(&codec::escape(value));
            }
            WalEntry::Delete { key } => {
                line.extend_from_slice(DELETE_TAG);
                line.push(FIELD_SEPARATOR);
                line.extend_from_slice(&codec::escape(key));
            }
        }
        line.push(LINE_TERMINATOR);
        line
    }

    /// Decode one line (terminator already stripped)
    pub fn decode(line: &[u8]) -> Result<Self, String> {
        let fields = codec::split_fields(line, 3);

        match fields.as_slice() {
            [tag, key, value] if *tag == PUT_TAG => Ok(WalEntry::Put {
                key: codec::unescape(key)?,
                value: codec::unescape(value)?,
            }),
            [tag, key] if *tag == DELETE_TAG => Ok(WalEntry::Delete {
                key: codec::unescape(key)?,
            }),
            [tag, ..] if *tag == PUT_TAG || *tag == DELETE_TAG => Err(format!(
                "{} record with {} fields",
                String::from_utf8_lossy(tag),
                fields.len()
            )),
            [tag, ..] => Err(format!(
                "unknown operation {:?}",
                String::from_utf8_lossy(tag)
            )),
            [] => Err("empty record".to_string()),
        }
    }
}
