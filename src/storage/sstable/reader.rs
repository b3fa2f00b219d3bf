//! SSTable Reader
//!
//! Opens an SSTable data file for one sequential pass.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::iterator::SSTableIterator;

/// Reader for SSTable files
///
/// Records are read linearly; callers stop early once the sorted order
/// carries them past the keys they want.
pub struct SSTableReader {
    /// File handle for reading entries
    pub(super) file: BufReader<File>,
    /// Path, for error reporting
    pub(super) path: PathBuf,
}

impl SSTableReader {
    /// Open an SSTable for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file: BufReader::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an iterator over all entries from the start of the file
    pub fn iter(&mut self) -> SSTableIterator<'_> {
        SSTableIterator::new(&mut self.file, &self.path)
    }
}
