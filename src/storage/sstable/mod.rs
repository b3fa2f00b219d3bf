//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted run plus a sidecar filter.
//!
//! ## Files per generation
//! ```text
//! sstable_<timestamp_ms>.txt   data, one record per line, ascending by key
//! sstable_<timestamp_ms>.bf    bloom filter over every key in the data file
//! ```
//!
//! ## Record Format
//! ```text
//! ┌───────────────┬───┬──────────────────────────────┬────┐
//! │ escaped key   │ , │ escaped value | __TOMBSTONE__ │ \n │
//! └───────────────┴───┴──────────────────────────────┴────┘
//! ```

mod builder;
mod iterator;
mod reader;

use std::cmp::Ordering;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::codec::{self, FIELD_SEPARATOR, LINE_TERMINATOR};
use crate::error::Result;

use super::filter::BloomFilter;
use super::Lookup;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

// =============================================================================
// Shared Constants (used by builder, reader, iterator, manager)
// =============================================================================

/// File name prefix shared by data and filter files
pub const FILE_PREFIX: &str = "sstable_";

/// Extension of the data file
pub const DATA_EXTENSION: &str = "txt";

/// Extension of the sidecar filter file
pub const FILTER_EXTENSION: &str = "bf";

/// Value slot sentinel marking a deleted key
pub const TOMBSTONE: &[u8] = b"__TOMBSTONE__";

/// One decoded record: `None` value means tombstone
pub type Record = (Vec<u8>, Option<Vec<u8>>);

/// Path of the data file for a generation
pub fn data_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{}{}.{}", FILE_PREFIX, generation, DATA_EXTENSION))
}

/// Path of the filter file for a generation
pub fn filter_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{}{}.{}", FILE_PREFIX, generation, FILTER_EXTENSION))
}

/// Parse the generation out of a file name with the given extension
/// "sstable_1700000000000.txt" → Some(1700000000000)
pub fn parse_generation(path: &Path, extension: &str) -> Option<u64> {
    if path.extension()?.to_str()? != extension {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix(FILE_PREFIX)?.parse().ok()
}

/// Encode one record line (terminator included)
pub(crate) fn encode_record(key: &[u8], value: Option<&[u8]>) -> Vec<u8> {
    let mut line = codec::escape(key);
    line.push(FIELD_SEPARATOR);
    match value {
        None => line.extend_from_slice(TOMBSTONE),
        Some(v) if v == TOMBSTONE => {
            line.extend_from_slice(b"\\");
            line.extend_from_slice(v);
        }
        Some(v) => line.extend_from_slice(&codec::escape(v)),
    }
    line.push(LINE_TERMINATOR);
    line
}

/// Decode one record line (terminator stripped)
pub(crate) fn decode_record(line: &[u8]) -> std::result::Result<Record, String> {
    let fields = codec::split_fields(line, 2);
    if fields.len() != 2 {
        return Err("missing value field".to_string());
    }

    let key = codec::unescape(fields[0])?;
    let value = if fields[1] == TOMBSTONE {
        None
    } else {
        Some(codec::unescape(fields[1])?)
    };

    Ok((key, value))
}

// =============================================================================
// SSTable Handle
// =============================================================================

/// Handle to one committed sorted run
///
/// Holds the filter in memory; the data file is opened per call so no file
/// handle outlives a lookup or scan.
#[derive(Debug)]
pub struct SSTable {
    generation: u64,
    path: PathBuf,
    filter_path: PathBuf,
    filter: Option<BloomFilter>,
}

impl SSTable {
    /// Attach to an existing run in `dir`
    ///
    /// A missing or corrupt sidecar is not fatal: the run stays readable
    /// and every lookup falls back to a full scan.
    pub fn open(dir: &Path, generation: u64) -> Self {
        let path = data_path(dir, generation);
        let filter_path = filter_path(dir, generation);

        let filter = match BloomFilter::load(&filter_path) {
            Ok(Some(filter)) => {
                debug!(generation, bits = filter.num_bits(), "loaded sstable filter");
                Some(filter)
            }
            Ok(None) => {
                warn!(generation, "sstable has no filter, lookups will scan");
                None
            }
            Err(e) => {
                warn!(generation, error = %e, "ignoring unreadable sstable filter");
                None
            }
        };

        Self {
            generation,
            path,
            filter_path,
            filter,
        }
    }

    /// Write a complete run from records sorted ascending by key
    pub fn write<'a, I>(
        dir: &Path,
        generation: u64,
        records: I,
        false_positive_rate: f64,
    ) -> Result<Self>
    where
        I: ExactSizeIterator<Item = (&'a [u8], Option<&'a [u8]>)>,
    {
        let mut builder =
            SSTableBuilder::new(dir, generation, records.len(), false_positive_rate)?;
        for (key, value) in records {
            match value {
                Some(v) => builder.add(key, v)?,
                None => builder.add_tombstone(key)?,
            }
        }
        builder.finish()
    }

    pub(crate) fn from_parts(
        generation: u64,
        path: PathBuf,
        filter_path: PathBuf,
        filter: BloomFilter,
    ) -> Self {
        Self {
            generation,
            path,
            filter_path,
            filter: Some(filter),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filter_path(&self) -> &Path {
        &self.filter_path
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Filter check; without a filter every key might be present
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.filter.as_ref().map_or(true, |f| f.contains(key))
    }

    /// Look up one key, stopping as soon as the sorted scan passes it
    pub fn point_lookup(&self, key: &[u8]) -> Result<Lookup> {
        if !self.might_contain(key) {
            return Ok(Lookup::NotFound);
        }

        let mut reader = SSTableReader::open(&self.path)?;
        for record in reader.iter() {
            let (k, value) = record?;
            match k.as_slice().cmp(key) {
                Ordering::Less => continue,
                Ordering::Equal => {
                    return Ok(match value {
                        Some(v) => Lookup::Found(v),
                        None => Lookup::Deleted,
                    })
                }
                Ordering::Greater => break,
            }
        }

        Ok(Lookup::NotFound)
    }

    /// Records with keys in `[lo, hi]`, tombstones included
    pub fn range_scan(&self, lo: &[u8], hi: &[u8]) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        if lo > hi {
            return Ok(out);
        }

        let mut reader = SSTableReader::open(&self.path)?;
        for record in reader.iter() {
            let (key, value) = record?;
            if key.as_slice() < lo {
                continue;
            }
            if key.as_slice() > hi {
                break;
            }
            out.push((key, value));
        }

        Ok(out)
    }

    /// Every record in the run, in key order
    pub fn records(&self) -> Result<Vec<Record>> {
        let mut reader = SSTableReader::open(&self.path)?;
        reader.iter().collect()
    }

    /// Delete the sidecar, then the data file
    ///
    /// The data file goes last: while it exists the run is intact, and an
    /// orphaned sidecar is cleaned up at the next open.
    pub fn remove_files(&self) -> Result<()> {
        match fs::remove_file(&self.filter_path) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        fs::remove_file(&self.path)?;
        Ok(())
    }
}
