//! Injection rule definitions.

use super::InjectionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// What a rule does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionType {
    HttpError,
    HttpLatency,
    DbError,
    DbSlow,
    StorageError,
    /// Perturbs a recorded metric value; `endpoint` holds the metric name.
    MetricAnomaly,
}

impl InjectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionType::HttpError => "http_error",
            InjectionType::HttpLatency => "http_latency",
            InjectionType::DbError => "db_error",
            InjectionType::DbSlow => "db_slow",
            InjectionType::StorageError => "storage_error",
            InjectionType::MetricAnomaly => "metric_anomaly",
        }
    }

    /// Rule types that delay the request rather than fail it.
    pub fn is_latency(&self) -> bool {
        matches!(self, InjectionType::HttpLatency | InjectionType::DbSlow)
    }

    /// Rule types that short-circuit the request with an error.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            InjectionType::HttpError | InjectionType::DbError | InjectionType::StorageError
        )
    }
}

impl fmt::Display for InjectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declarative injection rule scoped to one `(service, endpoint)` pair.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InjectionRule {
    /// Assigned on insert when empty.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub injection_type: InjectionType,
    pub service: String,
    #[serde(default)]
    pub endpoint: String,
    pub rate: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Type-specific parameters (`delay_ms`, `min_ms`/`max_ms`, `abort`,
    /// `mode`, `factor`, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
}

fn default_enabled() -> bool {
    true
}

impl InjectionRule {
    /// Enabled rule with empty id, config and error fields.
    pub fn new(
        injection_type: InjectionType,
        service: impl Into<String>,
        endpoint: impl Into<String>,
        rate: f64,
    ) -> Self {
        Self {
            id: String::new(),
            injection_type,
            service: service.into(),
            endpoint: endpoint.into(),
            rate,
            enabled: true,
            config: HashMap::new(),
            error_type: String::new(),
            error_code: String::new(),
            error_message: String::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_error(
        mut self,
        error_type: impl Into<String>,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        self.error_type = error_type.into();
        self.error_code = error_code.into();
        self.error_message = error_message.into();
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn validate(&self) -> Result<(), InjectionError> {
        if self.service.trim().is_empty() {
            return Err(InjectionError::InvalidRule(
                "service must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rate) {
            return Err(InjectionError::InvalidRule(format!(
                "rate {} is outside [0, 1]",
                self.rate
            )));
        }
        Ok(())
    }

    pub fn matches(&self, service: &str, endpoint: &str) -> bool {
        self.enabled && self.service == service && self.endpoint == endpoint
    }

    /// Config value as `u64`, if present and numeric.
    pub fn config_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(Value::as_u64)
    }

    /// Config value as `f64`, if present and numeric.
    pub fn config_f64(&self, key: &str) -> Option<f64> {
        self.config.get(key).and_then(Value::as_f64)
    }

    pub fn config_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(Value::as_bool)
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}
