//! Storage Module
//!
//! Persistent storage layer: immutable sorted runs on disk.
//!
//! ## Responsibilities
//! - Persist MemTable snapshots as sorted runs (SSTables)
//! - Skip runs via per-run bloom filters on point lookups
//! - Resolve reads newest generation → oldest
//! - Full-merge compaction of all runs into one
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── sstable_1700000000000.txt   (generation 1700000000000, data)
//!   ├── sstable_1700000000000.bf    (its filter)
//!   ├── sstable_1700000004211.txt
//!   └── sstable_1700000004211.bf
//! ```

pub mod filter;
mod manager;
pub mod sstable;

pub use filter::BloomFilter;
pub use manager::SSTableManager;
pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, SSTableReader};

/// Outcome of a point lookup against one or more sorted runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Live value
    Found(Vec<u8>),

    /// A tombstone shadows any older value
    Deleted,

    /// No record for the key
    NotFound,
}

impl Lookup {
    /// Collapse to the public view: tombstones read as absent
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::Deleted | Lookup::NotFound => None,
        }
    }
}
