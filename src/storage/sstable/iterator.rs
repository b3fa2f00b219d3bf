//! SSTable Iterator
//!
//! Sequential iteration over all entries in an SSTable.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::codec::LINE_TERMINATOR;
use crate::error::{Result, StrataError};

use super::{decode_record, Record};

/// Iterator over SSTable entries in sorted key order
pub struct SSTableIterator<'a> {
    file: &'a mut BufReader<File>,
    path: &'a Path,
    /// 1-based number of the last line read
    line_no: u64,
    buf: Vec<u8>,
    done: bool,
}

impl<'a> SSTableIterator<'a> {
    pub(super) fn new(file: &'a mut BufReader<File>, path: &'a Path) -> Self {
        Self {
            file,
            path,
            line_no: 0,
            buf: Vec::new(),
            done: false,
        }
    }
}

impl<'a> Iterator for SSTableIterator<'a> {
    /// (key, Option<value>); a `None` value is a tombstone
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        self.buf.clear();
        match self.file.read_until(LINE_TERMINATOR, &mut self.buf) {
            Ok(0) => {
                self.done = true;
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                self.done = true;
                return Some(Err(StrataError::Io(e)));
            }
        }
        self.line_no += 1;

        if self.buf.last() == Some(&LINE_TERMINATOR) {
            self.buf.pop();
        }

        match decode_record(&self.buf) {
            Ok(record) => Some(Ok(record)),
            Err(reason) => {
                self.done = true;
                Some(Err(StrataError::CorruptRecord {
                    path: self.path.to_path_buf(),
                    line: self.line_no,
                    reason,
                }))
            }
        }
    }
}
