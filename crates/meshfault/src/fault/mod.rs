//! Controllable background faults.
//!
//! A [`Fault`] is a named disturbance with a two-state lifecycle:
//!
//! ```text
//! stopped --start()--> running --stop()--> stopped
//! ```
//!
//! Both transitions are compare-and-set on an atomic flag, so concurrent
//! callers racing on the same fault see exactly one winner. The loser gets
//! [`FaultError::AlreadyRunning`] or [`FaultError::NotRunning`] and nothing
//! else happens.
//!
//! - `worker`: [`TickWorker`], the single background thread a running fault owns
//! - `memleak`: [`MemLeakFault`], steady memory pressure
//! - `cpu`: [`CpuStressFault`], periodic busy-spin
//! - `manager`: [`FaultManager`], the name-keyed registry

mod cpu;
mod manager;
mod memleak;
mod worker;

use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub use cpu::{CpuStressFault, CpuStressStats};
pub use manager::FaultManager;
pub use memleak::{MemLeakFault, MemLeakStats};
pub use worker::TickWorker;

/// Errors from fault lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaultError {
    #[error("fault not found: {0}")]
    NotFound(String),
    #[error("fault {0} is already running")]
    AlreadyRunning(String),
    #[error("fault {0} is not running")]
    NotRunning(String),
    #[error("failed to spawn worker for fault {name}: {reason}")]
    Spawn { name: String, reason: String },
}

/// Observable lifecycle state of a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultStatus {
    Running,
    Stopped,
}

impl FaultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultStatus::Running => "running",
            FaultStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for FaultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, restartable background disturbance.
///
/// Implementations must make `start` and `stop` atomic with respect to each
/// other: a second `start` on a running fault is rejected without spawning
/// anything, and `stop` returns only after the background work has exited.
/// `status` must never block on the background work.
pub trait Fault: Send + Sync {
    fn name(&self) -> &str;

    fn start(&self) -> Result<(), FaultError>;

    fn stop(&self) -> Result<(), FaultError>;

    fn status(&self) -> FaultStatus;
}
