//! Metric anomaly injection.
//!
//! A `metric_anomaly` rule uses its `endpoint` field as the metric name.
//! When it fires, the value about to be recorded is replaced according to
//! `config.mode`:
//!
//! | mode       | result                                  | parameter (default) |
//! |------------|-----------------------------------------|---------------------|
//! | `multiply` | `value * factor`                        | `factor` (10.0)     |
//! | `offset`   | `value + offset`                        | `offset` (100.0)    |
//! | `replace`  | `value`                                 | `value` (0.0)       |
//! | `spike`    | `value * factor`, sign flipped at random| `factor` (10.0)     |
//!
//! The returned value is always finite and differs from the input: if a mode
//! would yield the same bits or a non-finite result, `original + 1.0` is
//! returned, or the adjacent float once `+ 1.0` no longer changes the value.
//! A non-finite input becomes `0.0`.

use super::engine::InjectionEngine;
use super::rule::{InjectionRule, InjectionType};
use crate::gate::ProbabilityGate;
use crate::metrics;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_FACTOR: f64 = 10.0;
const DEFAULT_OFFSET: f64 = 100.0;
const DEFAULT_REPLACEMENT: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnomalyMode {
    Multiply(f64),
    Offset(f64),
    Replace(f64),
    Spike(f64),
}

impl AnomalyMode {
    /// Read the mode from a rule's config. Unknown modes and malformed
    /// parameters fall back to defaults.
    pub fn from_rule(rule: &InjectionRule) -> Self {
        let factor = rule.config_f64("factor").unwrap_or(DEFAULT_FACTOR);
        match rule.config_str("mode").unwrap_or("multiply") {
            "multiply" => AnomalyMode::Multiply(factor),
            "offset" => AnomalyMode::Offset(rule.config_f64("offset").unwrap_or(DEFAULT_OFFSET)),
            "replace" => {
                AnomalyMode::Replace(rule.config_f64("value").unwrap_or(DEFAULT_REPLACEMENT))
            }
            "spike" => AnomalyMode::Spike(factor),
            other => {
                warn!(
                    "Rule {} has unknown anomaly mode '{}', using multiply",
                    rule.id, other
                );
                AnomalyMode::Multiply(DEFAULT_FACTOR)
            }
        }
    }

    fn apply(&self, original: f64, gate: &ProbabilityGate) -> f64 {
        let perturbed = match *self {
            AnomalyMode::Multiply(factor) => original * factor,
            AnomalyMode::Offset(offset) => original + offset,
            AnomalyMode::Replace(value) => value,
            AnomalyMode::Spike(factor) => {
                let sign = if gate.flip() { -1.0 } else { 1.0 };
                original * factor * sign
            }
        };
        if perturbed.is_finite() && perturbed.to_bits() != original.to_bits() {
            perturbed
        } else {
            distinct_from(original)
        }
    }
}

/// A finite value whose bits differ from `original`.
///
/// `original + 1.0` when that changes the value, otherwise the adjacent
/// float toward zero (large magnitudes). Non-finite inputs map to `0.0`.
fn distinct_from(original: f64) -> f64 {
    if !original.is_finite() {
        return 0.0;
    }
    let bumped = original + 1.0;
    if bumped.is_finite() && bumped.to_bits() != original.to_bits() {
        bumped
    } else {
        f64::from_bits(original.to_bits() - 1)
    }
}

/// Perturbs metric values for one service before they are recorded.
#[derive(Clone)]
pub struct MetricAnomalyService {
    engine: Arc<InjectionEngine>,
    service: String,
}

impl MetricAnomalyService {
    pub fn new(engine: Arc<InjectionEngine>, service: impl Into<String>) -> Self {
        Self {
            engine,
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Return `original_value` unless an enabled anomaly rule for
    /// `(service, metric_name)` fires, in which case return a perturbed value.
    pub fn inject_metric_anomaly(&self, metric_name: &str, original_value: f64) -> f64 {
        let Some(rule) = self.engine.find_rule(&self.service, metric_name, |r| {
            r.injection_type == InjectionType::MetricAnomaly
        }) else {
            return original_value;
        };

        if !self.engine.gate(rule.rate) {
            return original_value;
        }

        let mode = AnomalyMode::from_rule(&rule);
        let perturbed = mode.apply(original_value, self.engine.probability_gate());
        debug!(
            "Metric {} perturbed by rule {}: {} -> {} ({:?})",
            metric_name, rule.id, original_value, perturbed, mode
        );
        metrics::record_metric_anomaly(metric_name, &rule.id);
        perturbed
    }
}

impl std::fmt::Debug for MetricAnomalyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricAnomalyService")
            .field("service", &self.service)
            .finish()
    }
}
