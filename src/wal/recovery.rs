//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;

use tracing::warn;

use crate::error::{Result, StrataError};

use super::reader::{WalRead, WalReader};
use super::WalEntry;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of malformed lines skipped
    pub entries_corrupted: u64,

    /// Whether an unterminated tail (partial write) was found
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file, in write order
    ///
    /// Malformed lines are skipped and counted; an unterminated final line
    /// is ignored. The file is not modified. A missing file recovers nothing.
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut reader = match WalReader::open(path) {
            Ok(reader) => reader,
            Err(StrataError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                return Ok((Vec::new(), RecoveryResult::default()))
            }
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();

        while let Some(read) = reader.next_entry()? {
            match read {
                WalRead::Entry(entry) => {
                    entries.push(entry);
                    result.entries_recovered += 1;
                }
                WalRead::Corrupt { line, reason } => {
                    warn!(path = %path.display(), line, %reason, "skipping malformed WAL record");
                    result.entries_corrupted += 1;
                }
                WalRead::Torn { bytes } => {
                    warn!(path = %path.display(), bytes, "ignoring partial WAL record at tail");
                    result.was_truncated = true;
                }
            }
        }

        Ok((entries, result))
    }

    /// Cut an unterminated tail off the file so new appends start on a
    /// line boundary. Returns whether anything was removed.
    pub fn repair_tail(path: &Path) -> Result<bool> {
        let mut reader = WalReader::open(path)?;
        let mut torn = false;
        while let Some(read) = reader.next_entry()? {
            if let WalRead::Torn { .. } = read {
                torn = true;
            }
        }

        if torn {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(reader.valid_len())?;
            file.sync_all()?;
        }

        Ok(torn)
    }
}
