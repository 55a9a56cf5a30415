//! Configuration loading traits and types.
//!
//! Every StepGate binary reads a single TOML file (`stepgate.toml`) into a
//! [`StepGateConfig`]. Sections other than `[shared]` and `[cipher]` fall back
//! to their defaults when omitted.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "debug"
//! service_name = "stepgate-front-left"
//!
//! [servo]
//! min_angle = 0.0
//! max_angle = 180.0
//! max_slew_per_command = 90.0
//!
//! [pwm]
//! driver = "sysfs_pwm"
//! chip = 0
//! channel = 0
//!
//! [mqtt]
//! host = "192.168.0.10"
//!
//! [cipher]
//! device_key_file = "/etc/stepgate/device.key"
//! ```

use crate::consts::{ENV_BROKER_HOST, ENV_BROKER_PORT};
use crate::hal::config::PwmConfig;
use crate::mqtt::MqttConfig;
use crate::servo::ServoConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Common configuration fields shared across all StepGate applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the device's pre-shared X25519 secret comes from.
///
/// Exactly one of the two fields must be set. Key material is never
/// generated or rotated by StepGate.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CipherConfig {
    /// File containing the 32-byte secret as hex (surrounding whitespace ignored).
    #[serde(default)]
    pub device_key_file: Option<PathBuf>,

    /// Inline 32-byte secret as hex. Intended for development setups.
    #[serde(default)]
    pub device_key_hex: Option<String>,
}

impl std::fmt::Debug for CipherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherConfig")
            .field("device_key_file", &self.device_key_file)
            .field(
                "device_key_hex",
                &self.device_key_hex.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl CipherConfig {
    /// Validate that exactly one key source is configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.device_key_file, &self.device_key_hex) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (None, None) => Err(ConfigError::ValidationError(
                "cipher: one of device_key_file or device_key_hex is required".to_string(),
            )),
            (Some(_), Some(_)) => Err(ConfigError::ValidationError(
                "cipher: device_key_file and device_key_hex are mutually exclusive".to_string(),
            )),
        }
    }
}

/// Top-level configuration loaded from `stepgate.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepGateConfig {
    /// Logging and instance identity.
    pub shared: SharedConfig,

    /// Motion limits and physical travel.
    #[serde(default)]
    pub servo: ServoConfig,

    /// Servo driver selection and pulse parameters.
    #[serde(default)]
    pub pwm: PwmConfig,

    /// Broker connection.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Device key source.
    pub cipher: CipherConfig,
}

impl StepGateConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.servo.validate()?;
        self.pwm.validate()?;
        self.mqtt.validate()?;
        self.cipher.validate()
    }

    /// Apply the deployment environment overrides (`IP_ADDRESS`, `PORT`).
    ///
    /// `lookup` abstracts the environment so callers can pass
    /// `|k| std::env::var(k).ok()` or a fixed map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_BROKER_HOST) {
            debug!(%host, "Broker host from {}", ENV_BROKER_HOST);
            self.mqtt.host = host;
        }
        if let Some(port) = lookup(ENV_BROKER_PORT) {
            self.mqtt.port = port.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "{ENV_BROKER_PORT} is not a valid port: {port:?}"
                ))
            })?;
            debug!(port = self.mqtt.port, "Broker port from {}", ENV_BROKER_PORT);
        }
        Ok(())
    }

    /// Load, apply process environment overrides and validate.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }
}

/// Trait for loading configuration from TOML files.
///
/// Blanket-implemented for every `serde::de::DeserializeOwned` type.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax or shape is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[shared]
service_name = "stepgate-test"

[cipher]
device_key_hex = "0101010101010101010101010101010101010101010101010101010101010101"
"#;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct TestWrapper {
            level: LogLevel,
        }

        for (text, level) in [
            ("trace", LogLevel::Trace),
            ("debug", LogLevel::Debug),
            ("info", LogLevel::Info),
            ("warn", LogLevel::Warn),
            ("error", LogLevel::Error),
        ] {
            let parsed = TestWrapper::from_toml(&format!("level = \"{text}\"")).unwrap();
            assert_eq!(parsed.level, level);
        }
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = StepGateConfig::load(Path::new("/nonexistent/path/stepgate.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_config_loader_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid toml {{{{").unwrap();

        let result = StepGateConfig::load(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_minimal_config_uses_section_defaults() {
        let config = StepGateConfig::from_toml(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Info);
        assert_eq!(config.servo, ServoConfig::default());
        assert_eq!(config.pwm.driver, "simulation");
        assert_eq!(config.mqtt.topic, "engine_control");
    }

    #[test]
    fn test_config_loader_success() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[shared]
log_level = "debug"
service_name = "front-left"

[servo]
max_angle = 120.0
max_slew_per_command = 60.0

[mqtt]
host = "broker.local"
port = 8883

[cipher]
device_key_file = "/etc/stepgate/device.key"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = StepGateConfig::load(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Debug);
        assert_eq!(config.servo.max_angle, 120.0);
        assert_eq!(config.servo.max_slew_per_command, 60.0);
        assert_eq!(config.servo.min_angle, 0.0);
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
    }

    #[test]
    fn test_cipher_requires_exactly_one_source() {
        let none = CipherConfig::default();
        assert!(none.validate().is_err());

        let both = CipherConfig {
            device_key_file: Some(PathBuf::from("/tmp/k")),
            device_key_hex: Some("00".to_string()),
        };
        assert!(both.validate().is_err());
    }

    #[test]
    fn test_cipher_debug_redacts_inline_key() {
        let config = CipherConfig {
            device_key_file: None,
            device_key_hex: Some("deadbeef".to_string()),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("deadbeef"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_env_overrides_broker() {
        let mut config = StepGateConfig::from_toml(MINIMAL).unwrap();
        let env: HashMap<&str, &str> = [("IP_ADDRESS", "10.0.0.7"), ("PORT", "1884")].into();

        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.mqtt.host, "10.0.0.7");
        assert_eq!(config.mqtt.port, 1884);
    }

    #[test]
    fn test_env_override_rejects_bad_port() {
        let mut config = StepGateConfig::from_toml(MINIMAL).unwrap();
        let result = config.apply_env_overrides(|k| (k == "PORT").then(|| "eighty".to_string()));
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
