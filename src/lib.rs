//! # StrataKV
//!
//! An embedded, single-node LSM-tree key-value storage engine with:
//! - Write-Ahead Logging (WAL) for durability and crash recovery
//! - A sorted MemTable with tombstones, flushed at an entry threshold
//! - Immutable SSTables with bloom-filter sidecars
//! - Full-merge compaction, on demand or on a background thread
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                            │
//! │        put / delete / batch_put / get / read_key_range       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐      ┌──────────────┐
//!   │  MemTable   │── owns ─▶│     WAL     │      │  Background  │
//!   │  (RwLock)   │          │  (Append)   │      │  Compaction  │
//!   └──────┬──────┘          └─────────────┘      └──────┬───────┘
//!          │ flush                                       │
//!          ▼                                             │
//!   ┌──────────────────────────────────────┐            │
//!   │           SSTableManager             │◀───────────┘
//!   │  sstable_<ts>.txt + sstable_<ts>.bf  │   compact
//!   └──────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod codec;
pub mod compaction;
pub mod engine;
pub mod memtable;
pub mod storage;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, WalSyncStrategy};
pub use engine::StorageEngine;
pub use error::{Result, StrataError};
pub use storage::{BloomFilter, Lookup, SSTableManager};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StrataKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
