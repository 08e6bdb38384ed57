//! Configuration for the meshfault daemon.

use crate::injection::{InjectionRule, DEFAULT_MAX_RULES};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Service name the injection middleware evaluates rules against.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Seed for the shared probability gate. Entropy-seeded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default)]
    pub admin: AdminConfig,

    /// Optional demo upstream served behind the injection middleware.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demo: Option<DemoConfig>,

    #[serde(default)]
    pub faults: FaultsConfig,

    #[serde(default)]
    pub injection: InjectionConfig,
}

fn default_service_name() -> String {
    "meshfault".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_host")]
    pub host: String,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

fn default_admin_host() -> String {
    "0.0.0.0".to_string()
}

fn default_admin_port() -> u16 {
    2526
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: default_admin_host(),
            port: default_admin_port(),
        }
    }
}

impl AdminConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid admin address {}:{}: {e}", self.host, self.port))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DemoConfig {
    #[serde(default = "default_admin_host")]
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FaultsConfig {
    /// Registered unless set to `null` explicitly.
    #[serde(default = "default_mem_leak")]
    pub mem_leak: Option<MemLeakConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_stress: Option<CpuStressConfig>,
}

fn default_mem_leak() -> Option<MemLeakConfig> {
    Some(MemLeakConfig::default())
}

impl Default for FaultsConfig {
    fn default() -> Self {
        Self {
            mem_leak: default_mem_leak(),
            cpu_stress: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemLeakConfig {
    /// Bytes allocated per tick
    #[serde(default = "default_alloc_size")]
    pub alloc_size: usize,
    #[serde(default = "default_alloc_delay_ms")]
    pub alloc_delay_ms: u64,
}

fn default_alloc_size() -> usize {
    1024 * 1024
}

fn default_alloc_delay_ms() -> u64 {
    100
}

impl Default for MemLeakConfig {
    fn default() -> Self {
        Self {
            alloc_size: default_alloc_size(),
            alloc_delay_ms: default_alloc_delay_ms(),
        }
    }
}

impl MemLeakConfig {
    pub fn alloc_delay(&self) -> Duration {
        Duration::from_millis(self.alloc_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CpuStressConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_duty_cycle")]
    pub duty_cycle: f64,
}

fn default_tick_ms() -> u64 {
    100
}

fn default_duty_cycle() -> f64 {
    0.5
}

impl Default for CpuStressConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            duty_cycle: default_duty_cycle(),
        }
    }
}

impl CpuStressConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InjectionConfig {
    #[serde(default = "default_max_rules")]
    pub max_rules: usize,
    #[serde(default)]
    pub rules: Vec<InjectionRule>,
}

fn default_max_rules() -> usize {
    DEFAULT_MAX_RULES
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            max_rules: default_max_rules(),
            rules: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            seed: None,
            admin: AdminConfig::default(),
            demo: None,
            faults: FaultsConfig::default(),
            injection: InjectionConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, anyhow::Error> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.service_name.trim().is_empty() {
            anyhow::bail!("'service_name' must not be empty");
        }

        self.admin.socket_addr()?;

        if let Some(ref mem_leak) = self.faults.mem_leak {
            if mem_leak.alloc_size == 0 {
                anyhow::bail!("'faults.mem_leak.alloc_size' must be greater than 0");
            }
            if mem_leak.alloc_delay_ms == 0 {
                anyhow::bail!("'faults.mem_leak.alloc_delay_ms' must be greater than 0");
            }
        }

        if let Some(ref cpu) = self.faults.cpu_stress {
            if cpu.tick_ms == 0 {
                anyhow::bail!("'faults.cpu_stress.tick_ms' must be greater than 0");
            }
            if !(cpu.duty_cycle > 0.0 && cpu.duty_cycle <= 1.0) {
                anyhow::bail!(
                    "'faults.cpu_stress.duty_cycle' must be in (0, 1], got {}",
                    cpu.duty_cycle
                );
            }
        }

        if self.injection.rules.len() > self.injection.max_rules {
            anyhow::bail!(
                "{} injection rules configured but 'injection.max_rules' is {}",
                self.injection.rules.len(),
                self.injection.max_rules
            );
        }

        for (index, rule) in self.injection.rules.iter().enumerate() {
            rule.validate().map_err(|e| {
                anyhow::anyhow!("Invalid injection rule #{} ('{}'): {}", index, rule.id, e)
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injection::InjectionType;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.service_name, "meshfault");
        assert_eq!(config.admin.port, 2526);
        assert!(config.seed.is_none());
        assert!(config.faults.mem_leak.is_some());
        assert_eq!(config.injection.max_rules, DEFAULT_MAX_RULES);
    }

    #[test]
    fn test_empty_file_matches_builtin_defaults() {
        let builtin = Config::default();
        for yaml in ["{}", "faults: {}", "faults:\n  cpu_stress: {}\n"] {
            let loaded = Config::from_yaml(yaml).unwrap();
            let mem = loaded.faults.mem_leak.as_ref().unwrap();
            let expected = builtin.faults.mem_leak.as_ref().unwrap();
            assert_eq!(mem.alloc_size, expected.alloc_size);
            assert_eq!(mem.alloc_delay_ms, expected.alloc_delay_ms);
        }
    }

    #[test]
    fn test_mem_leak_disabled_with_null() {
        let config = Config::from_yaml("faults:\n  mem_leak: null\n").unwrap();
        assert!(config.faults.mem_leak.is_none());

        let yaml = serde_yaml::to_string(&config).unwrap();
        let reloaded = Config::from_yaml(&yaml).unwrap();
        assert!(reloaded.faults.mem_leak.is_none());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
service_name: storage
seed: 42
admin:
  host: 127.0.0.1
  port: 9000
demo:
  port: 8081
faults:
  mem_leak:
    alloc_size: 4096
    alloc_delay_ms: 20
  cpu_stress:
    duty_cycle: 0.25
injection:
  max_rules: 10
  rules:
    - id: obj-errors
      type: http_error
      service: storage
      endpoint: /objects
      rate: 0.1
      error_type: STORAGE_ERROR
      error_code: E1
      error_message: boom
    - type: metric_anomaly
      service: storage
      endpoint: request_latency_ms
      rate: 0.5
      config:
        mode: offset
        offset: 250
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.service_name, "storage");
        assert_eq!(config.seed, Some(42));
        assert_eq!(
            config.admin.socket_addr().unwrap(),
            "127.0.0.1:9000".parse().unwrap()
        );
        assert_eq!(config.demo.as_ref().unwrap().port, 8081);

        let mem = config.faults.mem_leak.as_ref().unwrap();
        assert_eq!(mem.alloc_size, 4096);
        assert_eq!(mem.alloc_delay(), Duration::from_millis(20));

        let cpu = config.faults.cpu_stress.as_ref().unwrap();
        assert_eq!(cpu.tick_ms, 100);
        assert_eq!(cpu.duty_cycle, 0.25);

        assert_eq!(config.injection.rules.len(), 2);
        assert_eq!(
            config.injection.rules[1].injection_type,
            InjectionType::MetricAnomaly
        );
    }

    #[test]
    fn test_invalid_rule_rate_rejected() {
        let yaml = r#"
injection:
  rules:
    - id: bad
      type: http_error
      service: storage
      endpoint: /objects
      rate: 1.5
"#;
        let err = Config::from_yaml(yaml).unwrap_err().to_string();
        assert!(err.contains("bad"), "{err}");
    }

    #[test]
    fn test_too_many_rules_rejected() {
        let yaml = r#"
injection:
  max_rules: 1
  rules:
    - {type: http_error, service: a, endpoint: /x, rate: 0.1}
    - {type: http_error, service: a, endpoint: /y, rate: 0.1}
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_zero_alloc_rejected() {
        let yaml = "faults:\n  mem_leak:\n    alloc_size: 0\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_bad_duty_cycle_rejected() {
        let yaml = "faults:\n  cpu_stress:\n    duty_cycle: 0\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "service_name: metadata\nadmin:\n  port: 3001").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.service_name, "metadata");
        assert_eq!(config.admin.port, 3001);
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::from_file("/nonexistent/meshfault.yaml").is_err());
    }

    #[test]
    fn test_default_registers_mem_leak() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.faults.mem_leak.is_some());
    }
}
