//! Single-thread ticking worker shared by the concrete faults.

use super::{FaultError, FaultStatus};
use crossbeam::channel::{bounded, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct WorkerHandle {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

/// Owns at most one background thread that calls a tick function once per
/// period until stopped.
///
/// The running flag is only flipped by compare-and-set. The handle slot lock
/// is held across a whole transition, so a `start` racing a `stop` waits for
/// the old thread to be joined before spawning a new one. `status` reads the
/// flag and never touches the lock.
pub struct TickWorker {
    name: String,
    running: AtomicBool,
    slot: Mutex<Option<WorkerHandle>>,
    runs: AtomicU64,
}

impl TickWorker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: AtomicBool::new(false),
            slot: Mutex::new(None),
            runs: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> FaultStatus {
        if self.running.load(Ordering::Acquire) {
            FaultStatus::Running
        } else {
            FaultStatus::Stopped
        }
    }

    /// Number of workers this instance has successfully spawned.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }

    /// Transition `stopped -> running` and spawn the tick thread.
    ///
    /// The stop signal is checked before every tick and wins over a tick
    /// that is due at the same time.
    pub fn start<F>(&self, period: Duration, mut on_tick: F) -> Result<(), FaultError>
    where
        F: FnMut() + Send + 'static,
    {
        let mut slot = self.slot.lock();

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FaultError::AlreadyRunning(self.name.clone()));
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let name = self.name.clone();

        let spawned = thread::Builder::new()
            .name(format!("fault-{}", self.name))
            .spawn(move || {
                debug!("Fault worker {} started (period={:?})", name, period);
                let mut next_tick = Instant::now() + period;
                loop {
                    match stop_rx.try_recv() {
                        Ok(()) | Err(TryRecvError::Disconnected) => break,
                        Err(TryRecvError::Empty) => {}
                    }

                    let wait = next_tick.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            on_tick();
                            next_tick += period;
                        }
                    }
                }
                debug!("Fault worker {} exiting", name);
            });

        match spawned {
            Ok(thread) => {
                *slot = Some(WorkerHandle { stop_tx, thread });
                self.runs.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(FaultError::Spawn {
                    name: self.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Transition `running -> stopped`, signal the thread and wait for it.
    pub fn stop(&self) -> Result<(), FaultError> {
        self.stop_with(|| {})
    }

    /// Like [`stop`](Self::stop), running `cleanup` after the thread has
    /// been joined and before any new `start` can proceed.
    pub fn stop_with<F: FnOnce()>(&self, cleanup: F) -> Result<(), FaultError> {
        let mut slot = self.slot.lock();

        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(FaultError::NotRunning(self.name.clone()));
        }

        if let Some(handle) = slot.take() {
            Self::shutdown(&self.name, handle);
        }
        cleanup();
        Ok(())
    }

    fn shutdown(name: &str, handle: WorkerHandle) {
        // A full channel means a stop is already queued.
        let _ = handle.stop_tx.try_send(());
        drop(handle.stop_tx);
        if handle.thread.join().is_err() {
            warn!("Fault worker {} panicked before shutdown", name);
        }
    }
}

impl Drop for TickWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.slot.get_mut().take() {
            Self::shutdown(&self.name, handle);
        }
    }
}

impl std::fmt::Debug for TickWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickWorker")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("runs", &self.runs())
            .finish()
    }
}
