// Library exports for the binary and integration tests

pub mod admin_api;
pub mod config;
pub mod demo;
pub mod error;
pub mod fault;
pub mod gate;
pub mod injection;
pub mod metrics;

pub use error::{AppError, ErrorKind};
pub use fault::{
    CpuStressFault, Fault, FaultError, FaultManager, FaultStatus, MemLeakFault, TickWorker,
};
pub use gate::ProbabilityGate;
pub use injection::{InjectionEngine, InjectionError, InjectionRule, InjectionType, MetricInjector};
