//! Rule-based request and metric injection.
//!
//! - `rule`: [`InjectionRule`] and [`InjectionType`]
//! - `engine`: [`InjectionEngine`], rule CRUD, matching and error materialization
//! - `anomaly`: [`MetricAnomalyService`], perturbation of recorded metric values
//! - `middleware`: [`MetricInjector`] and its tower layer for HTTP services

mod anomaly;
mod engine;
mod middleware;
mod rule;

use thiserror::Error;

pub use anomaly::{AnomalyMode, MetricAnomalyService};
pub use engine::{create_error, InjectionEngine, DEFAULT_LATENCY_MS, DEFAULT_MAX_RULES};
pub use middleware::{
    InjectionLayer, InjectionService, MetricInjector, RequestStart, REQUEST_ID_HEADER,
    RULE_ID_HEADER,
};
pub use rule::{InjectionRule, InjectionType};

/// Errors from rule management.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InjectionError {
    #[error("rule set is full ({0} rules)")]
    CapacityExceeded(usize),
    #[error("invalid rule: {0}")]
    InvalidRule(String),
    #[error("rule {0} already exists")]
    DuplicateRule(String),
    #[error("rule not found: {0}")]
    NotFound(String),
}
