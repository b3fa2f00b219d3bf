//! WAL Reader
//!
//! Handles reading entries from a WAL file, one line at a time.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::codec::LINE_TERMINATOR;
use crate::error::Result;

use super::WalEntry;

/// What one read from the WAL produced
#[derive(Debug)]
pub enum WalRead {
    /// A well-formed record
    Entry(WalEntry),

    /// A terminated line that does not parse
    Corrupt { line: u64, reason: String },

    /// Bytes after the last terminator: a write interrupted by a crash
    Torn { bytes: usize },
}

/// Reads entries from the WAL file
pub struct WalReader {
    file: BufReader<File>,
    path: PathBuf,
    /// 1-based number of the last line read
    line_no: u64,
    /// Byte offset just past the last terminated line
    valid_len: u64,
    buf: Vec<u8>,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file: BufReader::new(file),
            path: path.to_path_buf(),
            line_no: 0,
            valid_len: 0,
            buf: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the prefix made of complete lines read so far
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }

    /// Read the next record from the WAL
    pub fn next_entry(&mut self) -> Result<Option<WalRead>> {
        self.buf.clear();
        let read = self.file.read_until(LINE_TERMINATOR, &mut self.buf)?;
        if read == 0 {
            return Ok(None);
        }
        self.line_no += 1;

        if self.buf.last() != Some(&LINE_TERMINATOR) {
            return Ok(Some(WalRead::Torn { bytes: read }));
        }

        self.valid_len += read as u64;
        self.buf.pop();

        Ok(Some(match WalEntry::decode(&self.buf) {
            Ok(entry) => WalRead::Entry(entry),
            Err(reason) => WalRead::Corrupt {
                line: self.line_no,
                reason,
            },
        }))
    }
}
