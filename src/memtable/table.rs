//! MemTable implementation
//!
//! BTreeMap/BTreeSet memtable with RwLock for concurrency. The MemTable
//! owns the WAL and a shared handle to the SSTable manager it flushes into.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::storage::SSTableManager;
use crate::wal::{Wal, WalEntry};

use super::MemTableEntry;

#[derive(Debug, Default)]
struct MemState {
    live: BTreeMap<Vec<u8>, Vec<u8>>,
    tombstones: BTreeSet<Vec<u8>>,
}

impl MemState {
    fn apply_put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.tombstones.remove(&key);
        self.live.insert(key, value);
    }

    fn apply_delete(&mut self, key: Vec<u8>) {
        self.live.remove(&key);
        self.tombstones.insert(key);
    }
}

/// In-memory table for recent writes
///
/// ## Locking
/// - Writes take the write lock, append to the WAL, then mutate; so WAL
///   order is lock order and nothing is visible before it is logged.
/// - A threshold flush runs under that same write lock and takes the
///   manager's lock inside it (MemTable → manager, never the reverse).
/// - Compaction holds an upgradable read: readers continue, writers wait.
pub struct MemTable {
    state: RwLock<MemState>,
    wal: Wal,
    sstables: Arc<SSTableManager>,
    flush_threshold: usize,
}

impl MemTable {
    /// Create an empty MemTable writing through `wal` and flushing into
    /// `sstables` once `flush_threshold` live entries accumulate
    pub fn new(wal: Wal, sstables: Arc<SSTableManager>, flush_threshold: usize) -> Self {
        Self {
            state: RwLock::new(MemState::default()),
            wal,
            sstables,
            flush_threshold: flush_threshold.max(1),
        }
    }

    /// Log and insert a key-value pair, flushing at the threshold
    ///
    /// Once the WAL append succeeds the put is committed and this returns
    /// `Ok`. A failed threshold flush is logged and the entries stay in
    /// memory (and in the WAL) until the next flush attempt.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        self.put_locked(&mut state, key, value)
    }

    /// Log a delete, drop any live value and record a tombstone
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        self.wal.append_delete(key)?;
        state.apply_delete(key.to_vec());
        Ok(())
    }

    /// Apply puts in iteration order under one lock acquisition
    ///
    /// Each record is individually durable; the batch is not atomic.
    pub fn batch_put<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut state = self.state.write();
        for (key, value) in entries {
            self.put_locked(&mut state, key.as_ref(), value.as_ref())?;
        }
        Ok(())
    }

    /// Get a value by key (read lock)
    ///
    /// `None` means the MemTable knows nothing; the SSTables decide.
    pub fn get(&self, key: &[u8]) -> Option<MemTableEntry> {
        let state = self.state.read();
        if state.tombstones.contains(key) {
            return Some(MemTableEntry::Tombstone);
        }
        state.live.get(key).cloned().map(MemTableEntry::Value)
    }

    pub fn has_tombstone(&self, key: &[u8]) -> bool {
        self.state.read().tombstones.contains(key)
    }

    /// Live entries with keys in `[lo, hi]`, sorted
    pub fn read_range(&self, lo: &[u8], hi: &[u8]) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.range_snapshot(lo, hi).0
    }

    /// Live entries and tombstones with keys in `[lo, hi]`, taken together
    pub fn range_snapshot(
        &self,
        lo: &[u8],
        hi: &[u8],
    ) -> (BTreeMap<Vec<u8>, Vec<u8>>, BTreeSet<Vec<u8>>) {
        if lo > hi {
            return (BTreeMap::new(), BTreeSet::new());
        }

        let state = self.state.read();
        let bounds = (Bound::Included(lo), Bound::Included(hi));

        let tombstones: BTreeSet<Vec<u8>> = state
            .tombstones
            .range::<[u8], _>(bounds)
            .cloned()
            .collect();
        let live = state
            .live
            .range::<[u8], _>(bounds)
            .filter(|(k, _)| !tombstones.contains(k.as_slice()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        (live, tombstones)
    }

    /// Live entries in `[lo, hi]` merged over the SSTables, MemTable winning
    ///
    /// The SSTable scan runs under the read lock, so no flush can commit
    /// between the two halves and the result reflects a single instant.
    pub fn read_merged_range(&self, lo: &[u8], hi: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        if lo > hi {
            return Ok(BTreeMap::new());
        }

        let state = self.state.read();
        let bounds = (Bound::Included(lo), Bound::Included(hi));

        let mut merged = self.sstables.range_scan(lo, hi)?;
        for key in state.tombstones.range::<[u8], _>(bounds) {
            merged.remove(key);
        }
        for (key, value) in state.live.range::<[u8], _>(bounds) {
            merged.insert(key.clone(), value.clone());
        }
        Ok(merged)
    }

    /// Snapshot of every tombstone currently held
    pub fn tombstones(&self) -> BTreeSet<Vec<u8>> {
        self.state.read().tombstones.clone()
    }

    /// Persist live entries (and all tombstones) as a new SSTable, then
    /// rotate the WAL. Returns whether anything was flushed.
    pub fn flush(&self) -> Result<bool> {
        let mut state = self.state.write();
        self.flush_locked(&mut state)
    }

    /// Replay the WAL into memory without re-logging
    pub fn recover_from_wal(&self) -> Result<usize> {
        let (entries, stats) = self.wal.recover_with_stats()?;
        let mut state = self.state.write();

        let recovered = entries.len();
        for entry in entries {
            match entry {
                WalEntry::Put { key, value } => state.apply_put(key, value),
                WalEntry::Delete { key } => state.apply_delete(key),
            }
        }

        if recovered > 0 || stats.entries_corrupted > 0 || stats.was_truncated {
            info!(
                recovered,
                corrupted = stats.entries_corrupted,
                truncated = stats.was_truncated,
                live = state.live.len(),
                tombstones = state.tombstones.len(),
                "replayed WAL into memtable"
            );
        }

        Ok(recovered)
    }

    /// Compact every SSTable using the current tombstones as active deletes
    ///
    /// Writers wait for the duration. On success the tombstones that were
    /// fed in are dropped, since no run holds their keys anymore.
    pub fn compact_sstables(&self) -> Result<usize> {
        let state = self.state.upgradable_read();
        let active = state.tombstones.clone();

        let count = self.sstables.compact(&active)?;

        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        for key in &active {
            state.tombstones.remove(key);
        }
        debug!(retired = active.len(), "retired reconciled tombstones");

        Ok(count)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.state.read().live.len()
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.read();
        state.live.is_empty() && state.tombstones.is_empty()
    }

    pub fn tombstone_count(&self) -> usize {
        self.state.read().tombstones.len()
    }

    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    pub fn sstables(&self) -> &Arc<SSTableManager> {
        &self.sstables
    }

    /// Sync and close the WAL
    pub fn close(&self) -> Result<()> {
        // hold the write lock so no append races the close
        let _state = self.state.write();
        self.wal.close()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn put_locked(&self, state: &mut MemState, key: &[u8], value: &[u8]) -> Result<()> {
        self.wal.append_put(key, value)?;
        state.apply_put(key.to_vec(), value.to_vec());

        if state.live.len() >= self.flush_threshold {
            if let Err(e) = self.flush_locked(state) {
                error!(error = %e, live = state.live.len(), "threshold flush failed");
            }
        }
        Ok(())
    }

    fn flush_locked(&self, state: &mut MemState) -> Result<bool> {
        if state.live.is_empty() && self.wal.is_empty()? {
            return Ok(false);
        }

        // commit the run before touching memory so a failed write loses nothing
        self.sstables.write(&state.live, &state.tombstones)?;
        let flushed = state.live.len();
        state.live.clear();

        let obsolete = self.wal.rotate()?;
        if let Err(e) = fs::remove_file(&obsolete) {
            warn!(path = %obsolete.display(), error = %e, "failed to remove obsolete WAL");
        }

        info!(
            entries = flushed,
            tombstones = state.tombstones.len(),
            "flushed memtable"
        );

        Ok(true)
    }
}
