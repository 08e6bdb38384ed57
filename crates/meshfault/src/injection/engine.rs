//! Rule store and injection decisions.

use super::rule::{InjectionRule, InjectionType};
use super::InjectionError;
use crate::error::{AppError, ErrorKind};
use crate::gate::ProbabilityGate;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_MAX_RULES: usize = 1000;
pub const DEFAULT_LATENCY_MS: u64 = 100;
const DEFAULT_ERROR_MESSAGE: &str = "injected fault";

/// Holds the rule set and decides, per request, whether a rule fires.
///
/// Rules are kept in insertion order. When several enabled rules match the
/// same `(service, endpoint)`, the earliest inserted one wins.
pub struct InjectionEngine {
    rules: RwLock<Vec<InjectionRule>>,
    max_rules: usize,
    gate: Arc<ProbabilityGate>,
}

impl InjectionEngine {
    pub fn new(max_rules: usize) -> Self {
        Self::with_gate(max_rules, Arc::new(ProbabilityGate::new()))
    }

    /// Engine drawing from the given gate, e.g. the fault manager's.
    pub fn with_gate(max_rules: usize, gate: Arc<ProbabilityGate>) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            max_rules,
            gate,
        }
    }

    pub fn max_rules(&self) -> usize {
        self.max_rules
    }

    /// Insert a validated rule. An empty id is replaced by a fresh UUID.
    /// Returns the stored rule's id.
    pub fn add_rule(&self, mut rule: InjectionRule) -> Result<String, InjectionError> {
        rule.validate()?;
        if rule.id.is_empty() {
            rule.id = uuid::Uuid::new_v4().to_string();
        }

        let mut rules = self.rules.write();
        if rules.len() >= self.max_rules {
            return Err(InjectionError::CapacityExceeded(self.max_rules));
        }
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(InjectionError::DuplicateRule(rule.id));
        }

        info!(
            "Injection rule {} added ({} {}{} rate={})",
            rule.id, rule.injection_type, rule.service, rule.endpoint, rule.rate
        );
        let id = rule.id.clone();
        rules.push(rule);
        Ok(id)
    }

    /// Replace the rule with the same id, keeping its position.
    pub fn update_rule(&self, rule: InjectionRule) -> Result<(), InjectionError> {
        rule.validate()?;
        let mut rules = self.rules.write();
        let slot = rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or_else(|| InjectionError::NotFound(rule.id.clone()))?;
        debug!("Injection rule {} updated", rule.id);
        *slot = rule;
        Ok(())
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), InjectionError> {
        let mut rules = self.rules.write();
        let rule = rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| InjectionError::NotFound(id.to_string()))?;
        rule.enabled = enabled;
        info!(
            "Injection rule {} {}",
            id,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    pub fn remove_rule(&self, id: &str) -> Result<InjectionRule, InjectionError> {
        let mut rules = self.rules.write();
        let index = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| InjectionError::NotFound(id.to_string()))?;
        info!("Injection rule {} removed", id);
        Ok(rules.remove(index))
    }

    pub fn get_rule(&self, id: &str) -> Option<InjectionRule> {
        self.rules.read().iter().find(|r| r.id == id).cloned()
    }

    /// Snapshot of all rules in insertion order.
    pub fn rules(&self) -> Vec<InjectionRule> {
        self.rules.read().clone()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// First enabled rule matching `(service, endpoint)`. Consumes no
    /// randomness.
    pub fn get_injection_rule(&self, service: &str, endpoint: &str) -> Option<InjectionRule> {
        self.find_rule(service, endpoint, |_| true)
    }

    /// First enabled rule matching `(service, endpoint)` that also satisfies
    /// `filter`.
    pub fn find_rule<F>(&self, service: &str, endpoint: &str, filter: F) -> Option<InjectionRule>
    where
        F: Fn(&InjectionRule) -> bool,
    {
        self.rules
            .read()
            .iter()
            .find(|r| r.matches(service, endpoint) && filter(*r))
            .cloned()
    }

    /// Whether the matching rule (if any) fires for this request.
    pub fn should_inject(&self, service: &str, endpoint: &str) -> bool {
        match self.get_injection_rule(service, endpoint) {
            Some(rule) => self.gate.should_inject(rule.rate),
            None => false,
        }
    }

    /// Probability gate for callers that already hold a rule.
    pub fn gate(&self, rate: f64) -> bool {
        self.gate.should_inject(rate)
    }

    pub(crate) fn probability_gate(&self) -> &ProbabilityGate {
        &self.gate
    }

    /// Delay for a latency rule.
    ///
    /// Uses `config.delay_ms` when present, else a uniform draw in
    /// `[config.min_ms, config.max_ms]`, else [`DEFAULT_LATENCY_MS`].
    /// Malformed values fall back to the default.
    pub fn latency_for(&self, rule: &InjectionRule) -> Duration {
        if let Some(ms) = rule.config_u64("delay_ms") {
            return Duration::from_millis(ms);
        }
        match (rule.config_u64("min_ms"), rule.config_u64("max_ms")) {
            (Some(min), Some(max)) => Duration::from_millis(self.gate.draw_range(min, max)),
            (Some(ms), None) | (None, Some(ms)) => Duration::from_millis(ms),
            (None, None) => Duration::from_millis(DEFAULT_LATENCY_MS),
        }
    }

    /// Materialize the error a rule describes. Pure.
    pub fn create_error(&self, rule: &InjectionRule) -> AppError {
        create_error(rule)
    }
}

/// Map a rule's error fields onto an [`AppError`], filling defaults from the
/// rule type.
pub fn create_error(rule: &InjectionRule) -> AppError {
    let kind = if rule.error_type.trim().is_empty() {
        match rule.injection_type {
            InjectionType::DbError => ErrorKind::DatabaseError,
            InjectionType::StorageError => ErrorKind::StorageError,
            InjectionType::HttpLatency | InjectionType::DbSlow => ErrorKind::Timeout,
            InjectionType::HttpError | InjectionType::MetricAnomaly => ErrorKind::Internal,
        }
    } else {
        ErrorKind::parse(&rule.error_type)
    };

    let code = if rule.error_code.is_empty() {
        kind.as_str().to_string()
    } else {
        rule.error_code.clone()
    };
    let message = if rule.error_message.is_empty() {
        DEFAULT_ERROR_MESSAGE.to_string()
    } else {
        rule.error_message.clone()
    };

    AppError::new(kind, code, message)
}

impl Default for InjectionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RULES)
    }
}

impl std::fmt::Debug for InjectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InjectionEngine")
            .field("rules", &self.len())
            .field("max_rules", &self.max_rules)
            .finish()
    }
}
