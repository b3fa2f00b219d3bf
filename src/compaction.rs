//! Background Compaction
//!
//! A dedicated thread that compacts the SSTables at a fixed period.
//!
//! ## Scheduling
//! - One tick per period; a tick that overruns is followed immediately by
//!   the next one (the ticker holds at most one pending tick), never by two
//!   overlapping runs
//! - `stop()` signals the thread and joins it; a tick already running
//!   completes, no tick starts after the signal is seen

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use crossbeam::select;
use tracing::{debug, error, info};

use crate::error::{Result, StrataError};
use crate::memtable::MemTable;

/// Handle to a running compaction thread
pub struct BackgroundCompaction {
    /// Notifies the thread to stop working
    stop_tx: Sender<()>,
    /// `None` once joined
    handle: Option<JoinHandle<()>>,
    period: Duration,
}

impl BackgroundCompaction {
    /// Spawn the compaction thread
    pub fn start(memtable: Arc<MemTable>, period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(StrataError::Config(
                "background compaction period must be positive".to_string(),
            ));
        }

        let (stop_tx, stop_rx) = channel::bounded(1);
        let handle = thread::Builder::new()
            .name("stratakv-compaction".to_string())
            .spawn(move || run(memtable, period, stop_rx))
            .map_err(|e| StrataError::Background(format!("failed to spawn thread: {}", e)))?;

        info!(period_ms = period.as_millis() as u64, "background compaction started");

        Ok(Self {
            stop_tx,
            handle: Some(handle),
            period,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };

        // a full channel means a stop is already pending
        let _ = self.stop_tx.try_send(());
        handle
            .join()
            .map_err(|_| StrataError::Background("compaction thread panicked".to_string()))?;

        info!("background compaction stopped");
        Ok(())
    }
}

impl Drop for BackgroundCompaction {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "background compaction did not shut down cleanly");
        }
    }
}

fn run(memtable: Arc<MemTable>, period: Duration, stop_rx: Receiver<()>) {
    let ticker = channel::tick(period);

    loop {
        select! {
            recv(stop_rx) -> _ => return,
            recv(ticker) -> _ => {
                // both may be ready at once; stop wins
                match stop_rx.try_recv() {
                    Err(TryRecvError::Empty) => {}
                    _ => return,
                }

                match memtable.compact_sstables() {
                    Ok(sstables) => debug!(sstables, "background compaction tick"),
                    Err(e) => error!(error = %e, "background compaction failed"),
                }
            }
        }
    }
}
