//! Scan acquisition on a dedicated thread
//!
//! `get_scans` blocks the calling thread on native I/O. [`ScanWorker`] moves
//! a session onto its own thread, runs the start/pull/stop sequence there
//! and hands each scan back over a bounded channel.
//!
//! ```text
//! ┌──────────────┐  Result<Scan>  ┌──────────────┐
//! │ neo-scanner  │ ─────────────► │   consumer   │
//! │ (owns handle)│  bounded(N)    │ recv()/iter  │
//! └──────────────┘                └──────────────┘
//! ```
//!
//! Stopping is cooperative. [`ScanWorker::stop`] clears the running flag and
//! drops the receiver; the worker notices after its current pull returns,
//! stops scanning and closes the session. A pull blocked in the native
//! library may hold this up until its next timeout or error.

use super::DeviceSession;
use crate::error::{Error, Result};
use crate::types::Scan;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub use crossbeam_channel::RecvTimeoutError;

/// Default channel capacity (small to avoid handing out stale scans)
const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Settings the worker applies around its scan loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Motor speed set before scanning starts
    pub motor_speed: Option<i32>,
    /// Sample rate set before scanning starts
    pub sample_rate: Option<i32>,
    /// Motor speed set after scanning stops
    pub idle_motor_speed: Option<i32>,
    /// Scans buffered between worker and consumer
    pub channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            motor_speed: None,
            sample_rate: None,
            idle_motor_speed: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

type WorkerOutcome = (DeviceSession, Result<()>);

/// Background scan acquisition for one session
pub struct ScanWorker {
    running: Arc<AtomicBool>,
    scans: Option<Receiver<Result<Scan>>>,
    handle: Option<JoinHandle<WorkerOutcome>>,
}

impl ScanWorker {
    /// Spawn the worker thread.
    ///
    /// The session must be closed; the worker opens it and closes it again
    /// before handing it back from [`stop`](Self::stop).
    pub fn spawn(session: DeviceSession, config: WorkerConfig) -> Result<Self> {
        let (tx, rx) = bounded(config.channel_capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("neo-scanner".to_string())
            .spawn(move || run(session, config, tx, thread_running))
            .map_err(|e| Error::Other(format!("Failed to spawn scan worker: {}", e)))?;

        Ok(ScanWorker {
            running,
            scans: Some(rx),
            handle: Some(handle),
        })
    }

    /// Block for the next scan.
    ///
    /// Returns `None` once the worker has finished and the queue is drained.
    pub fn recv(&self) -> Option<Result<Scan>> {
        self.scans.as_ref()?.recv().ok()
    }

    /// Wait up to `timeout` for the next scan.
    ///
    /// [`RecvTimeoutError::Disconnected`] means the worker has finished and
    /// nothing is left to receive.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Result<Scan>, RecvTimeoutError> {
        match self.scans.as_ref() {
            Some(scans) => scans.recv_timeout(timeout),
            None => Err(RecvTimeoutError::Disconnected),
        }
    }

    /// Blocking iterator over received scans
    pub fn iter(&self) -> impl Iterator<Item = Result<Scan>> + '_ {
        self.scans.iter().flat_map(|rx| rx.iter())
    }

    /// True until the worker thread has exited
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop acquisition and wait for the worker.
    ///
    /// Returns the closed session, or the error that ended the worker's
    /// control sequence (scan errors are delivered through the channel).
    pub fn stop(mut self) -> Result<DeviceSession> {
        match self.shutdown() {
            Some((session, outcome)) => outcome.map(|()| session),
            None => Err(Error::Other("Scan worker panicked".into())),
        }
    }

    fn shutdown(&mut self) -> Option<WorkerOutcome> {
        self.running.store(false, Ordering::Relaxed);
        // Unblocks a worker waiting on a full channel
        self.scans.take();
        let handle = self.handle.take()?;
        handle.join().ok()
    }
}

impl Drop for ScanWorker {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        if let Some((_, Err(e))) = self.shutdown() {
            log::warn!("Scan worker ended with error: {}", e);
        }
    }
}

fn run(
    mut session: DeviceSession,
    config: WorkerConfig,
    tx: Sender<Result<Scan>>,
    running: Arc<AtomicBool>,
) -> WorkerOutcome {
    log::info!("Scan worker started on {}", session.port());

    let outcome = session.scoped(|device| {
        if let Some(hz) = config.sample_rate {
            device.set_sample_rate(hz)?;
        }
        if let Some(hz) = config.motor_speed {
            device.set_motor_speed(hz)?;
        }
        device.start_scanning()?;

        let mut delivered = 0u64;
        let mut scans = device.get_scans();
        while running.load(Ordering::Relaxed) {
            let Some(scan) = scans.next() else {
                break;
            };
            let failed = scan.is_err();
            if tx.send(scan).is_err() {
                log::debug!("Scan receiver dropped");
                break;
            }
            if failed {
                break;
            }
            delivered += 1;
        }
        log::info!("Scan worker delivered {} scans", delivered);

        device.stop_scanning()?;
        if let Some(hz) = config.idle_motor_speed {
            device.set_motor_speed(hz)?;
        }
        Ok(())
    });

    if let Err(e) = &outcome {
        log::error!("Scan worker error: {}", e);
    }
    log::info!("Scan worker stopped");
    (session, outcome)
}
