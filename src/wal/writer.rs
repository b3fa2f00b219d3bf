//! WAL Writer
//!
//! Handles appending entries to the active WAL file and rotating it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::WalSyncStrategy;
use crate::error::{Result, StrataError};

use super::recovery::{RecoveryResult, WalRecovery};
use super::{parse_wal_generation, wal_path, WalEntry};

/// The write-ahead log of one directory
///
/// All operations go through one internal mutex, so concurrent appends are
/// written as whole lines in lock-acquisition order.
pub struct Wal {
    dir: PathBuf,
    sync_strategy: WalSyncStrategy,
    state: Mutex<WalState>,
}

struct WalState {
    /// Active file
    path: PathBuf,
    generation: u64,
    /// `None` once closed or after a failed append
    writer: Option<BufWriter<File>>,
    /// Length of the active file up to the last successful append
    committed_len: u64,
    /// Appends since the last fsync (EveryNEntries)
    unsynced: usize,
}

impl Wal {
    /// Open the WAL of `dir`
    ///
    /// The newest `wal_<ts>.log` becomes the active file and is opened for
    /// append after any torn tail is cut off. Older WAL files were rotated
    /// out after their SSTable committed and are removed. With no WAL
    /// present a fresh one is created. Recovery is left to the caller.
    pub fn open(dir: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut generations: Vec<u64> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Some(generation) = parse_wal_generation(&path) {
                    generations.push(generation);
                }
            }
        }
        generations.sort_unstable();

        let generation = match generations.pop() {
            Some(latest) => {
                for stale in generations {
                    let stale_path = wal_path(dir, stale);
                    info!(path = %stale_path.display(), "removing obsolete WAL");
                    fs::remove_file(&stale_path)?;
                }

                let path = wal_path(dir, latest);
                if WalRecovery::repair_tail(&path)? {
                    warn!(path = %path.display(), "truncated partial record at WAL tail");
                }
                latest
            }
            None => now_millis(),
        };

        let path = wal_path(dir, generation);
        let writer = Self::open_writer(&path)?;
        let committed_len = writer.get_ref().metadata()?.len();
        debug!(path = %path.display(), committed_len, "opened WAL");

        Ok(Self {
            dir: dir.to_path_buf(),
            sync_strategy,
            state: Mutex::new(WalState {
                path,
                generation,
                writer: Some(writer),
                committed_len,
                unsynced: 0,
            }),
        })
    }

    /// Append a PUT record
    pub fn append_put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.append(&WalEntry::put(key, value))
    }

    /// Append a DELETE record
    pub fn append_delete(&self, key: &[u8]) -> Result<()> {
        self.append(&WalEntry::delete(key))
    }

    /// Append an entry and flush it to the OS (fsync per sync strategy)
    ///
    /// A failed write, flush or fsync cuts the file back to its last
    /// committed length and disables the WAL; every later append fails
    /// until the next rotation. A rejected record never reaches the log.
    pub fn append(&self, entry: &WalEntry) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let line = entry.encode();

        let sync = match self.sync_strategy {
            WalSyncStrategy::OsFlush => false,
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => state.unsynced + 1 >= count,
        };

        let writer = state
            .writer
            .as_mut()
            .ok_or_else(|| StrataError::WalWrite("WAL is closed".to_string()))?;

        match write_line(writer, &line, sync) {
            Ok(()) => {
                state.committed_len += line.len() as u64;
                state.unsynced = if sync { 0 } else { state.unsynced + 1 };
                Ok(())
            }
            Err(e) => {
                error!(path = %state.path.display(), error = %e, "WAL append failed, disabling WAL");
                if let Some(writer) = state.writer.take() {
                    // drop the buffered bytes instead of flushing them
                    let (file, _) = writer.into_parts();
                    if let Err(te) = file.set_len(state.committed_len) {
                        warn!(error = %te, "failed to truncate WAL after failed append");
                    }
                }
                Err(StrataError::WalWrite(format!("append failed: {}", e)))
            }
        }
    }

    /// Entries of the active file, in write order
    pub fn recover(&self) -> Result<Vec<WalEntry>> {
        Ok(self.recover_with_stats()?.0)
    }

    /// Entries of the active file plus recovery statistics
    pub fn recover_with_stats(&self) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut state = self.state.lock();
        if let Some(writer) = state.writer.as_mut() {
            writer.flush()?;
        }
        WalRecovery::recover(&state.path)
    }

    /// Close the active file and start a fresh one
    ///
    /// Returns the path of the previous file. It still exists; the caller
    /// deletes it once the data it covers is committed elsewhere.
    pub fn rotate(&self) -> Result<PathBuf> {
        let mut state = self.state.lock();

        if let Some(mut writer) = state.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        let generation = now_millis().max(state.generation + 1);
        let path = wal_path(&self.dir, generation);
        let writer = Self::open_writer(&path)?;

        let previous = std::mem::replace(&mut state.path, path);
        state.generation = generation;
        state.writer = Some(writer);
        state.committed_len = 0;
        state.unsynced = 0;

        info!(
            previous = %previous.display(),
            current = %state.path.display(),
            "rotated WAL"
        );

        Ok(previous)
    }

    /// Force sync to disk
    pub fn sync(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(writer) = state.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        state.unsynced = 0;
        Ok(())
    }

    /// Flush, fsync and release the file; later appends fail
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(mut writer) = state.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
            debug!(path = %state.path.display(), "closed WAL");
        }
        Ok(())
    }

    /// True when the active file holds no records
    pub fn is_empty(&self) -> Result<bool> {
        let mut state = self.state.lock();
        let len = match state.writer.as_mut() {
            Some(writer) => {
                writer.flush()?;
                writer.get_ref().metadata()?.len()
            }
            None => fs::metadata(&state.path)?.len(),
        };
        Ok(len == 0)
    }

    /// Path of the active file
    pub fn path(&self) -> PathBuf {
        self.state.lock().path.clone()
    }

    /// Generation (timestamp) of the active file
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    fn open_writer(path: &Path) -> Result<BufWriter<File>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(BufWriter::new(file))
    }
}

fn write_line(writer: &mut BufWriter<File>, line: &[u8], sync: bool) -> io::Result<()> {
    writer.write_all(line)?;
    writer.flush()?;
    if sync {
        writer.get_ref().sync_data()?;
    }
    Ok(())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
