//! SSTable Manager
//!
//! Manages the set of SSTables in one directory and coordinates reads,
//! flushes and compaction over them.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Search SSTables newest → oldest for reads
//! - Create new SSTables from MemTable flushes
//! - Merge every run into one during compaction

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::error::{Result, StrataError};

use super::sstable::{self, DATA_EXTENSION, FILE_PREFIX, FILTER_EXTENSION};
use super::{Lookup, SSTable};

/// Manages the on-disk runs of one directory
///
/// ## Concurrency:
/// - `sstables`: RwLock; lookups and scans hold a read guard for their whole
///   duration, flush and compaction hold the write guard
/// - `last_generation`: Atomic (lock-free)
/// - All methods use `&self`
pub struct SSTableManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Target false-positive rate for filters of new runs
    false_positive_rate: f64,

    /// Open SSTable handles, ordered oldest → newest
    sstables: RwLock<Vec<SSTable>>,

    /// Largest generation handed out so far
    last_generation: AtomicU64,
}

impl SSTableManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Remove leftovers of interrupted writes (`*.tmp`, orphan filters)
    /// 3. Discover existing SSTable files
    /// 4. Order by generation ascending and load each filter
    pub fn open(path: &Path, false_positive_rate: f64) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut generations: Vec<u64> = Vec::new();
        let mut filters: Vec<(u64, PathBuf)> = Vec::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();
            if !file_path.is_file() {
                continue;
            }

            if Self::is_partial_write(&file_path) {
                debug!(path = %file_path.display(), "removing partial sstable write");
                fs::remove_file(&file_path)?;
            } else if let Some(generation) = sstable::parse_generation(&file_path, DATA_EXTENSION) {
                generations.push(generation);
            } else if let Some(generation) =
                sstable::parse_generation(&file_path, FILTER_EXTENSION)
            {
                filters.push((generation, file_path));
            }
        }

        let live: HashSet<u64> = generations.iter().copied().collect();
        for (generation, filter_path) in filters {
            if !live.contains(&generation) {
                debug!(generation, "removing orphaned sstable filter");
                fs::remove_file(&filter_path)?;
            }
        }

        generations.sort_unstable();

        let sstables: Vec<SSTable> = generations
            .iter()
            .map(|&generation| SSTable::open(path, generation))
            .collect();

        let last_generation = generations.last().copied().unwrap_or(0);

        info!(
            dir = %path.display(),
            sstables = sstables.len(),
            "opened sstable directory"
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            false_positive_rate,
            sstables: RwLock::new(sstables),
            last_generation: AtomicU64::new(last_generation),
        })
    }

    /// Flush a MemTable snapshot to a new SSTable
    ///
    /// Live entries and tombstones are merged into one ascending sequence.
    /// Returns the new generation, or `None` when there was nothing to write.
    pub fn write(
        &self,
        live: &BTreeMap<Vec<u8>, Vec<u8>>,
        tombstones: &BTreeSet<Vec<u8>>,
    ) -> Result<Option<u64>> {
        let mut records: Vec<(&[u8], Option<&[u8]>)> = live
            .iter()
            .map(|(k, v)| (k.as_slice(), Some(v.as_slice())))
            .chain(tombstones.iter().map(|k| (k.as_slice(), None)))
            .collect();

        if records.is_empty() {
            return Ok(None);
        }

        // stable sort keeps the live entry first should a key sit in both
        records.sort_by(|a, b| a.0.cmp(b.0));
        records.dedup_by(|later, earlier| later.0 == earlier.0);

        let mut sstables = self.sstables.write();
        let generation = self.next_generation();
        let table = SSTable::write(
            &self.data_dir,
            generation,
            records.into_iter(),
            self.false_positive_rate,
        )?;
        sstables.push(table);

        info!(
            generation,
            live = live.len(),
            tombstones = tombstones.len(),
            "flushed memtable to sstable"
        );

        Ok(Some(generation))
    }

    /// Point lookup across all runs, newest → oldest
    pub fn point_lookup(&self, key: &[u8]) -> Result<Lookup> {
        let sstables = self.sstables.read();

        for table in sstables.iter().rev() {
            match table.point_lookup(key)? {
                Lookup::NotFound => continue,
                hit => return Ok(hit),
            }
        }

        Ok(Lookup::NotFound)
    }

    /// Get a value by key; tombstones read as absent
    pub fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.point_lookup(key)?.into_value())
    }

    /// Live entries with keys in `[lo, hi]`, newest generation winning
    ///
    /// A tombstone claims its key so older values stay hidden, but is not
    /// itself returned. `lo > hi` yields an empty map.
    pub fn range_scan(&self, lo: &[u8], hi: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        if lo > hi {
            return Ok(BTreeMap::new());
        }

        let sstables = self.sstables.read();
        let mut seen: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();

        for table in sstables.iter().rev() {
            for (key, value) in table.range_scan(lo, hi)? {
                seen.entry(key).or_insert(value);
            }
        }

        Ok(seen
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }

    /// Merge every run into a single new run
    ///
    /// Keys in `active_tombstones` are dropped outright; the MemTable still
    /// marks them deleted. Among the remaining records the newest generation
    /// wins, and a winning tombstone drops the key from the output.
    ///
    /// The merged run is committed before any old file is removed, and old
    /// runs are removed oldest first. If a removal fails the remaining runs
    /// stay in the sequence (older than the merged run) and the error is
    /// returned. Returns the number of runs afterwards.
    pub fn compact(&self, active_tombstones: &BTreeSet<Vec<u8>>) -> Result<usize> {
        let mut sstables = self.sstables.write();
        if sstables.is_empty() {
            return Ok(0);
        }

        let inputs = sstables.len();
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        let mut dropped = 0usize;

        for table in sstables.iter().rev() {
            for (key, value) in table.records()? {
                if active_tombstones.contains(&key) {
                    dropped += 1;
                    continue;
                }
                merged.entry(key).or_insert(value);
            }
        }

        let survivors: Vec<(&[u8], Option<&[u8]>)> = merged
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_slice(), Some(v))))
            .collect();
        let resolved_deletes = merged.len() - survivors.len();
        let output_entries = survivors.len();

        let mut replacement = Vec::with_capacity(1);
        if !survivors.is_empty() {
            let generation = self.next_generation();
            replacement.push(SSTable::write(
                &self.data_dir,
                generation,
                survivors.into_iter(),
                self.false_positive_rate,
            )?);
        }

        let old = std::mem::replace(&mut *sstables, replacement);
        let mut old = old.into_iter();

        while let Some(table) = old.next() {
            if let Err(e) = table.remove_files() {
                error!(
                    generation = table.generation(),
                    error = %e,
                    "failed to remove compacted sstable"
                );
                // only runs whose data file survived can be read again
                let mut kept: Vec<SSTable> = std::iter::once(table)
                    .chain(old)
                    .filter(|t| t.path().exists())
                    .collect();
                let left_behind = kept.len();
                kept.append(&mut *sstables);
                *sstables = kept;
                return Err(StrataError::Storage(format!(
                    "compaction left {} old sstables in place",
                    left_behind
                )));
            }
            debug!(generation = table.generation(), "removed compacted sstable");
        }

        info!(
            inputs,
            output_entries,
            dropped_by_active_tombstones = dropped,
            resolved_deletes,
            "compacted sstables"
        );

        Ok(sstables.len())
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Generations currently in the sequence, oldest first
    pub fn generations(&self) -> Vec<u64> {
        self.sstables.read().iter().map(|t| t.generation()).collect()
    }

    /// Number of runs currently loaded without a filter
    pub fn unfiltered_count(&self) -> usize {
        self.sstables.read().iter().filter(|t| !t.has_filter()).count()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Next unique generation: wall-clock millis, bumped past the last one
    fn next_generation(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let prev = match self.last_generation.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |last| Some(now.max(last + 1)),
        ) {
            Ok(prev) | Err(prev) => prev,
        };
        now.max(prev + 1)
    }

    fn is_partial_write(path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };
        name.starts_with(FILE_PREFIX) && name.ends_with(".tmp")
    }
}
