//! Memory pressure fault.

use super::worker::TickWorker;
use super::{Fault, FaultError, FaultStatus};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Allocates a fixed-size block every period and keeps it alive until the
/// fault is stopped.
///
/// Every byte of a block is written so the pages are actually committed
/// rather than lazily mapped.
pub struct MemLeakFault {
    alloc_size: usize,
    alloc_delay: Duration,
    leak_data: Arc<Mutex<Vec<Vec<u8>>>>,
    worker: TickWorker,
}

/// Point-in-time view of a [`MemLeakFault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemLeakStats {
    /// Blocks currently held.
    pub blocks: usize,
    /// Bytes currently held.
    pub bytes: usize,
    /// Successful starts since construction.
    pub runs: u64,
}

impl MemLeakFault {
    pub const NAME: &'static str = "memleak";

    pub fn new(alloc_size: usize, alloc_delay: Duration) -> Self {
        Self::with_name(Self::NAME, alloc_size, alloc_delay)
    }

    pub fn with_name(name: impl Into<String>, alloc_size: usize, alloc_delay: Duration) -> Self {
        Self {
            alloc_size,
            alloc_delay,
            leak_data: Arc::new(Mutex::new(Vec::new())),
            worker: TickWorker::new(name),
        }
    }

    pub fn alloc_size(&self) -> usize {
        self.alloc_size
    }

    pub fn alloc_delay(&self) -> Duration {
        self.alloc_delay
    }

    pub fn stats(&self) -> MemLeakStats {
        let blocks = self.leak_data.lock().len();
        MemLeakStats {
            blocks,
            bytes: blocks * self.alloc_size,
            runs: self.worker.runs(),
        }
    }
}

/// Allocate a block and stamp a repeating byte pattern over all of it.
fn pressure_block(size: usize) -> Vec<u8> {
    let mut block = vec![0u8; size];
    for (i, byte) in block.iter_mut().enumerate() {
        *byte = (i % 251) as u8 ^ 0xA5;
    }
    block
}

impl Fault for MemLeakFault {
    fn name(&self) -> &str {
        self.worker.name()
    }

    fn start(&self) -> Result<(), FaultError> {
        let data = Arc::clone(&self.leak_data);
        let size = self.alloc_size;
        self.worker.start(self.alloc_delay, move || {
            let block = pressure_block(size);
            data.lock().push(block);
        })?;
        info!(
            "Memory leak fault {} started ({} bytes every {:?})",
            self.name(),
            self.alloc_size,
            self.alloc_delay
        );
        Ok(())
    }

    fn stop(&self) -> Result<(), FaultError> {
        self.worker.stop_with(|| {
            let released = std::mem::take(&mut *self.leak_data.lock());
            debug!(
                "Memory leak fault {} releasing {} blocks",
                self.worker.name(),
                released.len()
            );
        })?;
        info!("Memory leak fault {} stopped", self.name());
        Ok(())
    }

    fn status(&self) -> FaultStatus {
        self.worker.status()
    }
}

impl std::fmt::Debug for MemLeakFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemLeakFault")
            .field("name", &self.name())
            .field("alloc_size", &self.alloc_size)
            .field("alloc_delay", &self.alloc_delay)
            .field("status", &self.status())
            .finish()
    }
}
