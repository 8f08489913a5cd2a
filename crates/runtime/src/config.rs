//! Configuration management for the execgate runtime
//!
//! Provides centralized configuration handling with validation, environment
//! variable overrides, and secure defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::quantity::{CpuQuantity, MemoryQuantity};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("IO error reading config file: {message}")]
    IoError { message: String },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP boundary configuration
    pub api: ApiConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Resource ceilings enforced by the resource stage
    pub policy: ResourcePolicy,
    /// Replay guard retention and sweep cadence
    pub replay: ReplayConfig,
    /// Process sandbox backend settings
    pub sandbox: SandboxConfig,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API server port
    pub port: u16,
    /// API server host
    pub host: String,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

/// Policy ceilings for requested resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcePolicy {
    pub max_cpu: CpuQuantity,
    pub max_memory: MemoryQuantity,
    pub max_timeout_ms: u64,
}

/// Replay guard settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// How long a consumed request id stays blocked
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
    /// How often expired ids are swept
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

/// Process sandbox settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Directory under which each sandbox gets a private working directory
    pub work_root: PathBuf,
    /// Shell used to interpret the execution target
    pub shell: PathBuf,
    /// Maximum captured bytes per output stream
    pub max_output_bytes: usize,
    /// Apply rlimits to the child (requires the `resource-limits` feature)
    pub enforce_resource_limits: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            max_cpu: CpuQuantity::from_millicores(2000),
            max_memory: MemoryQuantity::from_bytes(512 * 1024 * 1024),
            max_timeout_ms: 300_000,
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            work_root: env::temp_dir().join("execgate"),
            shell: PathBuf::from("/bin/sh"),
            max_output_bytes: 1024 * 1024,
            enforce_resource_limits: false,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables and defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;

        Ok(config)
    }

    /// Override fields from `EXECGATE_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = env::var("EXECGATE_PORT") {
            self.api.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "EXECGATE_PORT".to_string(),
                reason: "Invalid port number".to_string(),
            })?;
        }

        if let Ok(host) = env::var("EXECGATE_HOST") {
            self.api.host = host;
        }

        if let Ok(level) = env::var("EXECGATE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("EXECGATE_LOG_FORMAT") {
            self.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                "compact" => LogFormat::Compact,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "EXECGATE_LOG_FORMAT".to_string(),
                        reason: "Must be one of: json, pretty, compact".to_string(),
                    })
                }
            };
        }

        if let Ok(cpu) = env::var("EXECGATE_MAX_CPU") {
            self.policy.max_cpu = cpu.parse().map_err(|e| ConfigError::InvalidValue {
                key: "EXECGATE_MAX_CPU".to_string(),
                reason: format!("{}", e),
            })?;
        }

        if let Ok(memory) = env::var("EXECGATE_MAX_MEMORY") {
            self.policy.max_memory = memory.parse().map_err(|e| ConfigError::InvalidValue {
                key: "EXECGATE_MAX_MEMORY".to_string(),
                reason: format!("{}", e),
            })?;
        }

        if let Ok(timeout) = env::var("EXECGATE_MAX_TIMEOUT_MS") {
            self.policy.max_timeout_ms =
                timeout.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "EXECGATE_MAX_TIMEOUT_MS".to_string(),
                    reason: "Invalid millisecond count".to_string(),
                })?;
        }

        if let Ok(root) = env::var("EXECGATE_WORK_ROOT") {
            self.sandbox.work_root = PathBuf::from(root);
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "api.port".to_string(),
                reason: "Port cannot be 0".to_string(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                reason: format!("Must be one of: {}", valid_levels.join(", ")),
            });
        }

        if self.policy.max_cpu.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "policy.max_cpu".to_string(),
                reason: "CPU ceiling must be > 0".to_string(),
            });
        }
        if self.policy.max_memory.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "policy.max_memory".to_string(),
                reason: "Memory ceiling must be > 0".to_string(),
            });
        }
        if self.policy.max_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "policy.max_timeout_ms".to_string(),
                reason: "Timeout ceiling must be > 0".to_string(),
            });
        }

        if self.replay.retention.is_zero() || self.replay.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "replay".to_string(),
                reason: "Retention and sweep interval must be > 0".to_string(),
            });
        }
        if self.replay.sweep_interval > self.replay.retention {
            return Err(ConfigError::InvalidValue {
                key: "replay.sweep_interval".to_string(),
                reason: "Sweep interval cannot exceed retention".to_string(),
            });
        }

        if !self.sandbox.work_root.is_absolute() {
            return Err(ConfigError::InvalidValue {
                key: "sandbox.work_root".to_string(),
                reason: format!(
                    "Working root must be an absolute path: {}",
                    self.sandbox.work_root.display()
                ),
            });
        }
        if self.sandbox.max_output_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sandbox.max_output_bytes".to_string(),
                reason: "Output cap must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.host, "127.0.0.1");
        assert_eq!(config.policy.max_cpu.millicores(), 2000);
        assert_eq!(config.policy.max_memory.to_string(), "512Mi");
        assert_eq!(config.replay.retention, Duration::from_secs(86_400));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        env::set_var("EXECGATE_PORT", "9090");
        env::set_var("EXECGATE_MAX_CPU", "1500m");
        env::set_var("EXECGATE_LOG_FORMAT", "json");

        let config = GatewayConfig::from_env().unwrap();
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.policy.max_cpu.millicores(), 1500);
        assert_eq!(config.logging.format, LogFormat::Json);

        env::remove_var("EXECGATE_PORT");
        env::remove_var("EXECGATE_MAX_CPU");
        env::remove_var("EXECGATE_LOG_FORMAT");
    }

    #[test]
    #[serial]
    fn test_invalid_env_quantity() {
        env::set_var("EXECGATE_MAX_MEMORY", "plenty");
        let result = GatewayConfig::from_env();
        env::remove_var("EXECGATE_MAX_MEMORY");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[api]
port = 7070

[policy]
max_cpu = "1"
max_memory = "1Gi"
max_timeout_ms = 60000

[replay]
retention = "2h"
sweep_interval = "10m"
"#
        )
        .unwrap();

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api.port, 7070);
        assert_eq!(config.api.host, "127.0.0.1");
        assert_eq!(config.policy.max_cpu.millicores(), 1000);
        assert_eq!(config.policy.max_memory.bytes(), 1 << 30);
        assert_eq!(config.replay.retention, Duration::from_secs(7200));
        assert_eq!(config.replay.sweep_interval, Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_quantity_in_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[policy]\nmax_cpu = \"two\"").unwrap();
        assert!(matches!(
            GatewayConfig::from_file(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_invalid_port() {
        let mut config = GatewayConfig::default();
        config.api.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sweep_longer_than_retention() {
        let mut config = GatewayConfig::default();
        config.replay.sweep_interval = Duration::from_secs(48 * 3600);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_work_root() {
        let mut config = GatewayConfig::default();
        config.sandbox.work_root = PathBuf::from("relative/dir");
        assert!(config.validate().is_err());
    }
}
