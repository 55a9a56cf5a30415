//! `[pwm]` configuration: driver selection and pulse-width mapping.

use crate::config::ConfigError;
use crate::consts::{
    DEFAULT_DRIVER, DEFAULT_MAX_PULSE_US, DEFAULT_MIN_PULSE_US, DEFAULT_PWM_PERIOD_US,
    DEFAULT_SYSFS_PWM_ROOT,
};
use crate::hal::types::NormalizedPosition;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(DEFAULT_SYSFS_PWM_ROOT)
}

fn default_period_us() -> u32 {
    DEFAULT_PWM_PERIOD_US
}

fn default_min_pulse_us() -> u32 {
    DEFAULT_MIN_PULSE_US
}

fn default_max_pulse_us() -> u32 {
    DEFAULT_MAX_PULSE_US
}

/// Driver and pulse parameters for the servo output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PwmConfig {
    /// Registered driver name ("simulation", "sysfs_pwm").
    #[serde(default = "default_driver")]
    pub driver: String,

    /// PWM chip index (`pwmchipN`).
    #[serde(default)]
    pub chip: u32,

    /// Channel index on the chip (`pwmN`).
    #[serde(default)]
    pub channel: u32,

    /// sysfs PWM class directory.
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,

    /// PWM period in microseconds.
    #[serde(default = "default_period_us")]
    pub period_us: u32,

    /// Pulse width at normalized 0.0.
    #[serde(default = "default_min_pulse_us")]
    pub min_pulse_us: u32,

    /// Pulse width at normalized 1.0.
    #[serde(default = "default_max_pulse_us")]
    pub max_pulse_us: u32,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            chip: 0,
            channel: 0,
            sysfs_root: default_sysfs_root(),
            period_us: DEFAULT_PWM_PERIOD_US,
            min_pulse_us: DEFAULT_MIN_PULSE_US,
            max_pulse_us: DEFAULT_MAX_PULSE_US,
        }
    }
}

impl PwmConfig {
    /// Validate the PWM configuration.
    ///
    /// # Validation Rules
    /// 1. `driver` is not empty
    /// 2. `period_us` > 0
    /// 3. `min_pulse_us < max_pulse_us <= period_us`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "pwm.driver cannot be empty".to_string(),
            ));
        }
        if self.period_us == 0 {
            return Err(ConfigError::ValidationError(
                "pwm.period_us must be greater than 0".to_string(),
            ));
        }
        if self.min_pulse_us >= self.max_pulse_us {
            return Err(ConfigError::ValidationError(format!(
                "pwm: min_pulse_us ({}) must be below max_pulse_us ({})",
                self.min_pulse_us, self.max_pulse_us
            )));
        }
        if self.max_pulse_us > self.period_us {
            return Err(ConfigError::ValidationError(format!(
                "pwm: max_pulse_us ({}) exceeds period_us ({})",
                self.max_pulse_us, self.period_us
            )));
        }
        Ok(())
    }

    /// Period in nanoseconds.
    #[inline]
    pub fn period_ns(&self) -> u64 {
        self.period_us as u64 * 1_000
    }

    /// Pulse width in nanoseconds for a normalized position.
    pub fn pulse_width_ns(&self, position: NormalizedPosition) -> u64 {
        let min = self.min_pulse_us as f64 * 1_000.0;
        let max = self.max_pulse_us as f64 * 1_000.0;
        (min + (max - min) * position.value()).round() as u64
    }
}
