//! SSTable Builder
//!
//! Writes sorted records to a temporary file and commits it with a rename,
//! so a half-written run is never visible under its final name.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, StrataError};
use crate::storage::filter::BloomFilter;

use super::{data_path, encode_record, filter_path, SSTable};

/// Builder for creating new SSTables from sorted entries
pub struct SSTableBuilder {
    generation: u64,
    /// Final data file path
    path: PathBuf,
    /// Where records are written until `finish()`
    tmp_path: PathBuf,
    filter_path: PathBuf,
    /// Buffered writer for performance
    writer: Option<BufWriter<File>>,
    /// Filter sized for the expected entry count
    filter: Option<BloomFilter>,
    /// Number of entries written
    entry_count: u64,
    /// Last key written, to enforce strictly ascending order
    last_key: Option<Vec<u8>>,
    finished: bool,
}

impl SSTableBuilder {
    /// Create a builder for generation `generation` in `dir`
    ///
    /// Call `add()`/`add_tombstone()` in strictly ascending key order, then
    /// `finish()` to persist the filter and commit the data file.
    pub fn new(
        dir: &Path,
        generation: u64,
        expected_entries: usize,
        false_positive_rate: f64,
    ) -> Result<Self> {
        let path = data_path(dir, generation);
        let tmp_path = path.with_extension("txt.tmp");

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            generation,
            path,
            tmp_path,
            filter_path: filter_path(dir, generation),
            writer: Some(BufWriter::new(file)),
            filter: Some(BloomFilter::new(expected_entries, false_positive_rate)),
            entry_count: 0,
            last_key: None,
            finished: false,
        })
    }

    /// Add a key-value pair (must be called in sorted key order)
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write_entry(key, Some(value))
    }

    /// Add a tombstone (must be called in sorted key order)
    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.write_entry(key, None)
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Internal: write an entry (value=None means tombstone)
    fn write_entry(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key <= last.as_slice() {
                return Err(StrataError::Storage(format!(
                    "SSTable keys out of order: {:?} after {:?}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(last)
                )));
            }
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| StrataError::Storage("SSTable builder already finished".to_string()))?;
        writer.write_all(&encode_record(key, value))?;

        if let Some(filter) = self.filter.as_mut() {
            filter.add(key);
        }
        self.last_key = Some(key.to_vec());
        self.entry_count += 1;

        Ok(())
    }

    /// Finish building: fsync data, persist the filter, rename into place
    pub fn finish(mut self) -> Result<SSTable> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| StrataError::Storage("SSTable builder already finished".to_string()))?;
        let file = writer.into_inner().map_err(|e| {
            StrataError::Storage(format!("Failed to flush SSTable: {}", e))
        })?;
        file.sync_all()?;
        drop(file);

        let filter = self
            .filter
            .take()
            .ok_or_else(|| StrataError::Storage("SSTable filter missing".to_string()))?;
        filter.save(&self.filter_path)?;

        fs::rename(&self.tmp_path, &self.path)?;
        self.finished = true;

        debug!(
            generation = self.generation,
            entries = self.entry_count,
            "sstable written"
        );

        Ok(SSTable::from_parts(
            self.generation,
            self.path.clone(),
            self.filter_path.clone(),
            filter,
        ))
    }
}

impl Drop for SSTableBuilder {
    fn drop(&mut self) {
        if !self.finished {
            // never committed: discard the partial data file and any sidecar
            self.writer.take();
            let _ = fs::remove_file(&self.tmp_path);
            let _ = fs::remove_file(&self.filter_path);
        }
    }
}
