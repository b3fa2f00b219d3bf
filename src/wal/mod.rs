//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append a record before any MemTable mutation becomes visible
//! - Replay the active file on startup
//! - Rotate to a fresh file once a flush has committed an SSTable
//!
//! ## File Format
//! ```text
//! wal_<timestamp_ms>.log, one record per line:
//! ┌─────────────────────────────────────────┐
//! │ PUT,<escaped key>,<escaped value>\n     │
//! │ DELETE,<escaped key>\n                  │
//! │ ...                                     │
//! └─────────────────────────────────────────┘
//! ```
//! A line without its terminator is a write cut short by a crash.

mod entry;
mod reader;
mod recovery;
mod writer;

use std::path::{Path, PathBuf};

pub use entry::WalEntry;
pub use reader::{WalRead, WalReader};
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::Wal;

/// File name prefix of WAL files
pub const WAL_PREFIX: &str = "wal_";

/// Extension of WAL files
pub const WAL_EXTENSION: &str = "log";

/// Path of the WAL file for a generation
pub fn wal_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{}{}.{}", WAL_PREFIX, generation, WAL_EXTENSION))
}

/// "wal_1700000000000.log" → Some(1700000000000)
pub fn parse_wal_generation(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != WAL_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix(WAL_PREFIX)?.parse().ok()
}
