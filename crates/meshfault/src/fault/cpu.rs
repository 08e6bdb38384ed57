//! CPU pressure fault.

use super::worker::TickWorker;
use super::{Fault, FaultError, FaultStatus};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Busy-spins for `duty_cycle * tick` at the start of every tick.
pub struct CpuStressFault {
    tick: Duration,
    duty_cycle: f64,
    spins: Arc<AtomicU64>,
    worker: TickWorker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CpuStressStats {
    /// Completed busy periods since construction.
    pub spins: u64,
    pub runs: u64,
}

impl CpuStressFault {
    pub const NAME: &'static str = "cpu";

    /// `duty_cycle` is clamped to `(0, 1]`; non-finite values become `0.5`.
    pub fn new(tick: Duration, duty_cycle: f64) -> Self {
        Self::with_name(Self::NAME, tick, duty_cycle)
    }

    pub fn with_name(name: impl Into<String>, tick: Duration, duty_cycle: f64) -> Self {
        let duty_cycle = if duty_cycle.is_finite() {
            duty_cycle.clamp(0.01, 1.0)
        } else {
            0.5
        };
        Self {
            tick,
            duty_cycle,
            spins: Arc::new(AtomicU64::new(0)),
            worker: TickWorker::new(name),
        }
    }

    pub fn duty_cycle(&self) -> f64 {
        self.duty_cycle
    }

    pub fn stats(&self) -> CpuStressStats {
        CpuStressStats {
            spins: self.spins.load(Ordering::Acquire),
            runs: self.worker.runs(),
        }
    }
}

fn spin_for(budget: Duration) {
    let begin = Instant::now();
    let mut acc: u64 = 0;
    while begin.elapsed() < budget {
        acc = std::hint::black_box(acc.wrapping_mul(6364136223846793005).wrapping_add(1));
        std::hint::spin_loop();
    }
}

impl Fault for CpuStressFault {
    fn name(&self) -> &str {
        self.worker.name()
    }

    fn start(&self) -> Result<(), FaultError> {
        let budget = self.tick.mul_f64(self.duty_cycle);
        let spins = Arc::clone(&self.spins);
        self.worker.start(self.tick, move || {
            spin_for(budget);
            spins.fetch_add(1, Ordering::AcqRel);
        })?;
        info!(
            "CPU stress fault {} started (tick={:?}, duty={:.2})",
            self.name(),
            self.tick,
            self.duty_cycle
        );
        Ok(())
    }

    fn stop(&self) -> Result<(), FaultError> {
        self.worker.stop()?;
        info!("CPU stress fault {} stopped", self.name());
        Ok(())
    }

    fn status(&self) -> FaultStatus {
        self.worker.status()
    }
}

impl std::fmt::Debug for CpuStressFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuStressFault")
            .field("name", &self.name())
            .field("tick", &self.tick)
            .field("duty_cycle", &self.duty_cycle)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_duty_cycle_clamped() {
        assert_eq!(CpuStressFault::new(Duration::from_millis(10), 5.0).duty_cycle(), 1.0);
        assert_eq!(CpuStressFault::new(Duration::from_millis(10), -1.0).duty_cycle(), 0.01);
        assert_eq!(
            CpuStressFault::new(Duration::from_millis(10), f64::NAN).duty_cycle(),
            0.5
        );
    }

    #[test]
    fn test_spins_while_running() {
        let fault = CpuStressFault::new(Duration::from_millis(10), 0.2);
        fault.start().unwrap();
        thread::sleep(Duration::from_millis(80));
        fault.stop().unwrap();

        let stats = fault.stats();
        assert!(stats.spins > 0);
        assert_eq!(stats.runs, 1);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(fault.stats().spins, stats.spins);
    }
}
