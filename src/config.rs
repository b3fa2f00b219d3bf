//! Configuration for StrataKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StrataError};

/// Default number of live MemTable entries that triggers a flush
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1000;

/// Default target false-positive rate for SSTable sidecar filters
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Main configuration for a StrataKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding all engine state
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal_<ts>.log       (write-ahead log)
    ///     ├── sstable_<ts>.txt   (sorted run)
    ///     └── sstable_<ts>.bf    (sidecar filter)
    pub data_dir: PathBuf,

    /// Target false-positive rate of each SSTable's filter, in (0, 1)
    pub filter_false_positive_rate: f64,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Number of live entries in the MemTable that triggers a flush
    pub flush_threshold: usize,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// If set, background compaction starts at open with this period
    pub background_compaction_period_ms: Option<u64>,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// Flush to the OS after every write, leave fsync to the OS
    OsFlush,

    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./stratakv_data"),
            filter_false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
            wal_sync_strategy: WalSyncStrategy::OsFlush,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            background_compaction_period_ms: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check every knob is within its legal range
    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold == 0 {
            return Err(StrataError::Config(
                "flush_threshold must be positive".to_string(),
            ));
        }

        let rate = self.filter_false_positive_rate;
        if !rate.is_finite() || rate <= 0.0 || rate >= 1.0 {
            return Err(StrataError::Config(format!(
                "filter_false_positive_rate must be in (0, 1), got {}",
                rate
            )));
        }

        if self.background_compaction_period_ms == Some(0) {
            return Err(StrataError::Config(
                "background_compaction_period_ms must be positive".to_string(),
            ));
        }

        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return Err(StrataError::Config(
                "EveryNEntries sync strategy needs a positive count".to_string(),
            ));
        }

        Ok(())
    }

    /// Background compaction period as a Duration, if configured
    pub fn background_compaction_period(&self) -> Option<Duration> {
        self.background_compaction_period_ms.map(Duration::from_millis)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the number of live entries that triggers a flush
    pub fn flush_threshold(mut self, entries: usize) -> Self {
        self.config.flush_threshold = entries;
        self
    }

    /// Set the target false-positive rate of SSTable filters
    pub fn filter_false_positive_rate(mut self, rate: f64) -> Self {
        self.config.filter_false_positive_rate = rate;
        self
    }

    /// Start background compaction at open with the given period
    pub fn background_compaction_period_ms(mut self, ms: u64) -> Self {
        self.config.background_compaction_period_ms = Some(ms);
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
