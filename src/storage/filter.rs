//! Bloom Filter
//!
//! Probabilistic membership summary stored next to every SSTable. A negative
//! answer is exact; a positive answer means the run has to be scanned.
//!
//! ## Sidecar Format
//! ```text
//! ┌──────────────────────────────────────────────┬───────────┐
//! │ bincode { num_bits: u64, num_hashes: u32,    │ CRC32 (4) │
//! │           bits: Vec<u64> }                   │  (LE)     │
//! └──────────────────────────────────────────────┴───────────┘
//! ```

use std::f64::consts::LN_2;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// Size of the CRC32 trailer in the sidecar file
const CHECKSUM_SIZE: usize = 4;

/// Bloom filter using double hashing over a CRC32 key digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloomFilter {
    /// Number of addressable bits (m)
    num_bits: u64,
    /// Number of probes per key (k)
    num_hashes: u32,
    /// Bit vector, 64 bits per word
    bits: Vec<u64>,
}

impl BloomFilter {
    /// Size a filter for `expected_count` keys at false-positive rate `p`
    ///
    /// m = ⌈-n · ln p / (ln 2)²⌉, k = ⌈(m / n) · ln 2⌉
    pub fn new(expected_count: usize, false_positive_rate: f64) -> Self {
        let n = expected_count.max(1) as f64;
        let m = (-n * false_positive_rate.ln() / (LN_2 * LN_2)).ceil().max(1.0);
        let k = ((m / n) * LN_2).ceil().max(1.0);

        let num_bits = m as u64;
        Self {
            num_bits,
            num_hashes: k as u32,
            bits: vec![0; words_for(num_bits)],
        }
    }

    /// Insert a key
    pub fn add(&mut self, key: &[u8]) {
        let (h1, h2) = key_hashes(key);
        for i in 0..self.num_hashes {
            let bit = self.bit_index(h1, h2, i);
            self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
        }
    }

    /// True if the key may have been added, false if it definitely was not
    pub fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = key_hashes(key);
        (0..self.num_hashes).all(|i| {
            let bit = self.bit_index(h1, h2, i);
            self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0
        })
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Encode to the sidecar byte layout (payload + CRC32 trailer)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes =
            bincode::serialize(self).map_err(|e| StrataError::Serialization(e.to_string()))?;
        let checksum = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        Ok(bytes)
    }

    /// Decode the sidecar byte layout, verifying checksum and shape
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CHECKSUM_SIZE {
            return Err(StrataError::CorruptFilter(format!(
                "sidecar too short: {} bytes",
                bytes.len()
            )));
        }

        let (payload, trailer) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
        let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let computed = crc32fast::hash(payload);
        if stored != computed {
            return Err(StrataError::CorruptFilter(format!(
                "checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored, computed
            )));
        }

        let filter: BloomFilter = bincode::deserialize(payload)
            .map_err(|e| StrataError::CorruptFilter(e.to_string()))?;

        if filter.num_bits == 0
            || filter.num_hashes == 0
            || filter.bits.len() != words_for(filter.num_bits)
        {
            return Err(StrataError::CorruptFilter(format!(
                "inconsistent shape: m={}, k={}, words={}",
                filter.num_bits,
                filter.num_hashes,
                filter.bits.len()
            )));
        }

        Ok(filter)
    }

    /// Persist to `path` via a temporary file and rename
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let tmp_path = path.with_extension("bf.tmp");

        let mut file = File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load a sidecar. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => Self::from_bytes(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn bit_index(&self, h1: u32, h2: u32, i: u32) -> u64 {
        (h1 as u64 + i as u64 * h2 as u64) % self.num_bits
    }
}

fn words_for(num_bits: u64) -> usize {
    num_bits.div_ceil(64) as usize
}

/// Two 32-bit hashes per key, both mixed from the key's CRC32
fn key_hashes(key: &[u8]) -> (u32, u32) {
    let digest = crc32fast::hash(key);
    let h1 = fmix32(digest);
    // odd step so the k probes never collapse onto one bit
    let h2 = fmix32(digest ^ 0x9e37_79b9) | 1;
    (h1, h2)
}

/// Murmur3 32-bit finalizer
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
