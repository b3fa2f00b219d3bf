//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Absorb every write after it is logged to the WAL
//! - Remember deletions (tombstones) until compaction reconciles them
//! - Flush live entries to a new SSTable at a size threshold
//! - Ordered iteration for range reads and SSTable creation
//!
//! ## Data Structure Choice
//! A BTreeMap of live values plus a BTreeSet of tombstones, behind one
//! RwLock so both change together:
//! - Ordered keys (required for range reads and SSTable generation)
//! - A key is never live and tombstoned at once
//! - Tombstones survive flushes; older runs may still hold the key

mod table;

pub use table::MemTable;

/// Result of a MemTable point lookup that hit
#[derive(Debug, Clone, PartialEq)]
pub enum MemTableEntry {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}
