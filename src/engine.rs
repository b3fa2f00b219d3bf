//! Engine Module
//!
//! The storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Expose put/get/delete/range/batch over MemTable and SSTables
//! - Recover the MemTable from the WAL on startup
//! - Run compaction on demand or on a background thread

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::compaction::BackgroundCompaction;
use crate::config::Config;
use crate::error::Result;
use crate::memtable::{MemTable, MemTableEntry};
use crate::storage::SSTableManager;
use crate::wal::Wal;

/// The main storage engine
///
/// ## Ownership
/// The SSTableManager is built first and shared with the MemTable, which
/// also owns the WAL. The engine holds both; nothing points back at it.
///
/// ## Read order
/// Point reads consult the MemTable before the SSTables. A flush moves
/// entries to an SSTable before clearing them from memory, so in that order
/// a concurrent flush can never hide a value. Range reads scan the SSTables
/// while holding the MemTable read lock, so a flush cannot commit between
/// the two halves and resurrect an older MemTable value.
pub struct StorageEngine {
    /// Engine configuration
    config: Config,

    /// Write target; owns the WAL (internal RwLock)
    memtable: Arc<MemTable>,

    /// On-disk runs (internal RwLock on the run sequence)
    sstables: Arc<SSTableManager>,

    /// Running background compaction, if any
    compactor: Mutex<Option<BackgroundCompaction>>,
}

impl StorageEngine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config, create the data directory
    /// 2. Load existing SSTables and their filters
    /// 3. Open the newest WAL and replay it into the MemTable
    /// 4. Start background compaction if a period is configured
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let sstables = Arc::new(SSTableManager::open(
            &config.data_dir,
            config.filter_false_positive_rate,
        )?);
        let wal = Wal::open(&config.data_dir, config.wal_sync_strategy)?;
        let memtable = Arc::new(MemTable::new(
            wal,
            Arc::clone(&sstables),
            config.flush_threshold,
        ));
        memtable.recover_from_wal()?;

        let engine = Self {
            config,
            memtable,
            sstables,
            compactor: Mutex::new(None),
        };

        if let Some(period) = engine.config.background_compaction_period() {
            engine.start_background_compaction(period)?;
        }

        info!(
            dir = %engine.config.data_dir.display(),
            sstables = engine.sstables.sstable_count(),
            memtable_entries = engine.memtable.len(),
            "storage engine ready"
        );

        Ok(engine)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.memtable.put(key, value)
    }

    /// Delete a key
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.memtable.delete(key)
    }

    /// Put many pairs, in iteration order
    pub fn batch_put<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        self.memtable.batch_put(entries)
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. MemTable tombstones and values (most recent data)
    /// 2. SSTables (newest to oldest)
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.memtable.get(key) {
            Some(MemTableEntry::Tombstone) => Ok(None),
            Some(MemTableEntry::Value(value)) => Ok(Some(value)),
            None => self.sstables.read(key),
        }
    }

    /// Every live key in `[lo, hi]` with its newest value, sorted
    ///
    /// `lo > hi` yields an empty map.
    pub fn read_key_range(&self, lo: &[u8], hi: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        self.memtable.read_merged_range(lo, hi)
    }

    /// Merge all SSTables into one, dropping MemTable-deleted keys
    ///
    /// Returns the number of SSTables afterwards (0 or 1).
    pub fn compact_ss_tables(&self) -> Result<usize> {
        self.memtable.compact_sstables()
    }

    /// Flush the MemTable to a new SSTable and rotate the WAL
    pub fn flush(&self) -> Result<bool> {
        self.memtable.flush()
    }

    /// Compact every `period` on a background thread
    ///
    /// Replaces a compaction thread that is already running.
    pub fn start_background_compaction(&self, period: Duration) -> Result<()> {
        let mut slot = self.compactor.lock();
        if let Some(running) = slot.take() {
            running.stop()?;
        }
        *slot = Some(BackgroundCompaction::start(
            Arc::clone(&self.memtable),
            period,
        )?);
        Ok(())
    }

    /// Stop the background thread, waiting for a running tick to finish
    pub fn stop_background_compaction(&self) -> Result<()> {
        match self.compactor.lock().take() {
            Some(running) => running.stop(),
            None => Ok(()),
        }
    }

    pub fn is_background_compaction_running(&self) -> bool {
        self.compactor.lock().is_some()
    }

    /// Period of the running compaction thread, if any
    pub fn background_compaction_period(&self) -> Option<Duration> {
        self.compactor.lock().as_ref().map(|c| c.period())
    }

    /// Close the engine gracefully
    ///
    /// Stops background compaction and syncs the WAL. The MemTable is not
    /// flushed; the next open replays it from the WAL.
    pub fn close(self) -> Result<()> {
        self.stop_background_compaction()?;
        self.memtable.close()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared handle to the SSTable manager
    pub fn sstables(&self) -> &Arc<SSTableManager> {
        &self.sstables
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.sstable_count()
    }

    /// Live entries currently in the MemTable
    pub fn memtable_len(&self) -> usize {
        self.memtable.len()
    }

    /// Tombstones currently in the MemTable
    pub fn tombstone_count(&self) -> usize {
        self.memtable.tombstone_count()
    }

    /// Path of the active WAL file
    pub fn wal_path(&self) -> std::path::PathBuf {
        self.memtable.wal().path()
    }
}
