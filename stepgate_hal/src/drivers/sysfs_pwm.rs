//! Linux sysfs PWM driver.
//!
//! Drives a hobby servo from a hardware PWM channel exposed under
//! `/sys/class/pwm/pwmchipN/pwmM`. All sysfs values are nanoseconds.
//!
//! | File          | Written on            | Value                    |
//! |---------------|-----------------------|--------------------------|
//! | `export`      | `init()` if needed    | channel index            |
//! | `period`      | `init()`              | `period_us * 1000`       |
//! | `duty_cycle`  | `write()`/`release()` | pulse width, 0 = release |
//! | `enable`      | first `write()`       | `1`, `0` on shutdown     |
//! | `unexport`    | `shutdown()`          | channel index            |

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use stepgate_common::hal::config::PwmConfig;
use stepgate_common::hal::driver::{HalError, ServoDriver};
use stepgate_common::hal::types::NormalizedPosition;
use tracing::{debug, info, warn};

/// Registry name of the sysfs PWM driver.
pub const DRIVER_NAME: &str = "sysfs_pwm";

/// How long udev may take to create the channel directory after export.
const EXPORT_TIMEOUT: Duration = Duration::from_millis(500);

/// Poll interval while waiting for the exported channel.
const EXPORT_POLL: Duration = Duration::from_millis(10);

/// Factory function to create a sysfs PWM driver instance.
pub fn create_driver() -> Box<dyn ServoDriver> {
    Box::new(SysfsPwmDriver::new())
}

#[derive(Debug)]
struct Channel {
    chip_dir: PathBuf,
    dir: PathBuf,
    index: u32,
    exported_by_us: bool,
    enabled: bool,
}

/// Servo output on a sysfs PWM channel.
pub struct SysfsPwmDriver {
    config: PwmConfig,
    channel: Option<Channel>,
}

impl SysfsPwmDriver {
    /// Create an uninitialized driver.
    pub fn new() -> Self {
        Self {
            config: PwmConfig::default(),
            channel: None,
        }
    }

    fn channel_mut(&mut self) -> Result<&mut Channel, HalError> {
        self.channel.as_mut().ok_or(HalError::NotInitialized)
    }

    fn set_duty_ns(&mut self, duty_ns: u64) -> Result<(), HalError> {
        let channel = self.channel_mut()?;
        write_attr(&channel.dir.join("duty_cycle"), duty_ns)?;
        if !channel.enabled {
            write_attr(&channel.dir.join("enable"), 1)?;
            channel.enabled = true;
            debug!("PWM channel {} enabled", channel.index);
        }
        Ok(())
    }
}

impl Default for SysfsPwmDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ServoDriver for SysfsPwmDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn init(&mut self, config: &PwmConfig) -> Result<(), HalError> {
        config
            .validate()
            .map_err(|e| HalError::ConfigError(e.to_string()))?;

        let chip_dir = config.sysfs_root.join(format!("pwmchip{}", config.chip));
        if !chip_dir.is_dir() {
            return Err(HalError::InitFailed(format!(
                "PWM chip not found: {}",
                chip_dir.display()
            )));
        }

        let dir = chip_dir.join(format!("pwm{}", config.channel));
        let exported_by_us = if dir.is_dir() {
            debug!("PWM channel already exported: {}", dir.display());
            false
        } else {
            write_attr(&chip_dir.join("export"), config.channel)
                .map_err(|e| HalError::InitFailed(e.to_string()))?;
            wait_for_dir(&dir)?;
            true
        };

        // The kernel rejects a period shorter than the current duty cycle.
        write_attr(&dir.join("duty_cycle"), 0).map_err(|e| HalError::InitFailed(e.to_string()))?;
        write_attr(&dir.join("period"), config.period_ns())
            .map_err(|e| HalError::InitFailed(e.to_string()))?;

        info!(
            "sysfs PWM ready: {} (period={}ns, pulse={}..{}us)",
            dir.display(),
            config.period_ns(),
            config.min_pulse_us,
            config.max_pulse_us
        );

        self.config = config.clone();
        self.channel = Some(Channel {
            chip_dir,
            dir,
            index: config.channel,
            exported_by_us,
            enabled: false,
        });
        Ok(())
    }

    fn write(&mut self, position: NormalizedPosition) -> Result<(), HalError> {
        let duty_ns = self.config.pulse_width_ns(position);
        self.set_duty_ns(duty_ns)
    }

    fn release(&mut self) -> Result<(), HalError> {
        let channel = self.channel_mut()?;
        write_attr(&channel.dir.join("duty_cycle"), 0)
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        let Some(channel) = self.channel.take() else {
            return Ok(());
        };

        write_attr(&channel.dir.join("duty_cycle"), 0)?;
        if channel.enabled {
            write_attr(&channel.dir.join("enable"), 0)?;
        }
        if channel.exported_by_us {
            if let Err(e) = write_attr(&channel.chip_dir.join("unexport"), channel.index) {
                warn!("Failed to unexport PWM channel {}: {}", channel.index, e);
            }
        }
        info!("sysfs PWM channel {} shut down", channel.index);
        Ok(())
    }
}

fn write_attr(path: &Path, value: impl std::fmt::Display) -> Result<(), HalError> {
    fs::write(path, value.to_string()).map_err(|e| {
        HalError::CommunicationError(format!("write {}: {}", path.display(), e))
    })
}

fn wait_for_dir(dir: &Path) -> Result<(), HalError> {
    let deadline = Instant::now() + EXPORT_TIMEOUT;
    while !dir.is_dir() {
        if Instant::now() >= deadline {
            return Err(HalError::InitFailed(format!(
                "PWM channel did not appear after export: {}",
                dir.display()
            )));
        }
        thread::sleep(EXPORT_POLL);
    }
    Ok(())
}
