//! Servo motion configuration.
//!
//! Two ranges describe the actuator:
//! - [`TravelRange`] is the physical travel that maps onto the driver's
//!   normalized `[0.0, 1.0]` interface.
//! - `min_angle..=max_angle` is the safe range commands must fall inside.
//!   It must lie within the travel.

use crate::config::ConfigError;
use crate::consts::{
    DEFAULT_MAX_ANGLE, DEFAULT_MAX_RATE_PER_TICK, DEFAULT_MAX_SLEW_PER_COMMAND, DEFAULT_MIN_ANGLE,
    DEFAULT_RELEASE_AFTER_TICKS, DEFAULT_TICK_US, DEFAULT_TOLERANCE,
};
use crate::hal::types::NormalizedPosition;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Physical travel of the actuator in angle units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelRange {
    /// Angle emitted at normalized 0.0.
    pub min: f64,
    /// Angle emitted at normalized 1.0.
    pub max: f64,
}

impl Default for TravelRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_ANGLE,
            max: DEFAULT_MAX_ANGLE,
        }
    }
}

impl TravelRange {
    /// Span of the travel.
    #[inline]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Whether `angle` lies within the physical travel.
    #[inline]
    pub fn contains(&self, angle: f64) -> bool {
        (self.min..=self.max).contains(&angle)
    }

    /// Map an angle onto the driver interface. Angles outside the travel
    /// saturate at the end stops.
    pub fn normalize(&self, angle: f64) -> NormalizedPosition {
        NormalizedPosition::saturating((angle - self.min) / self.span())
    }

    /// Map a normalized driver position back to an angle.
    pub fn denormalize(&self, position: NormalizedPosition) -> f64 {
        self.min + position.value() * self.span()
    }
}

fn default_min_angle() -> f64 {
    DEFAULT_MIN_ANGLE
}

fn default_max_angle() -> f64 {
    DEFAULT_MAX_ANGLE
}

fn default_max_slew() -> f64 {
    DEFAULT_MAX_SLEW_PER_COMMAND
}

fn default_max_rate() -> f64 {
    DEFAULT_MAX_RATE_PER_TICK
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_tick_us() -> u32 {
    DEFAULT_TICK_US
}

fn default_release_after_ticks() -> u32 {
    DEFAULT_RELEASE_AFTER_TICKS
}

fn default_true() -> bool {
    true
}

/// `[servo]` section of `stepgate.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoConfig {
    /// Lowest commandable angle.
    #[serde(default = "default_min_angle")]
    pub min_angle: f64,

    /// Highest commandable angle.
    #[serde(default = "default_max_angle")]
    pub max_angle: f64,

    /// Largest `|target - current|` a single command may request.
    #[serde(default = "default_max_slew")]
    pub max_slew_per_command: f64,

    /// Largest position change per tick.
    #[serde(default = "default_max_rate")]
    pub max_rate_per_tick: f64,

    /// Distance to target at which a move counts as arrived.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Stepping loop period in microseconds.
    #[serde(default = "default_tick_us")]
    pub tick_us: u32,

    /// Position assumed after calibration when the driver has no feedback.
    #[serde(default = "default_min_angle")]
    pub calibration_position: f64,

    /// Physical travel mapped onto the driver interface.
    #[serde(default)]
    pub travel: TravelRange,

    /// Stop holding pulses after the actuator has been idle for a while.
    #[serde(default = "default_true")]
    pub release_when_idle: bool,

    /// Idle ticks before release.
    #[serde(default = "default_release_after_ticks")]
    pub release_after_ticks: u32,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            min_angle: DEFAULT_MIN_ANGLE,
            max_angle: DEFAULT_MAX_ANGLE,
            max_slew_per_command: DEFAULT_MAX_SLEW_PER_COMMAND,
            max_rate_per_tick: DEFAULT_MAX_RATE_PER_TICK,
            tolerance: DEFAULT_TOLERANCE,
            tick_us: DEFAULT_TICK_US,
            calibration_position: DEFAULT_MIN_ANGLE,
            travel: TravelRange::default(),
            release_when_idle: true,
            release_after_ticks: DEFAULT_RELEASE_AFTER_TICKS,
        }
    }
}

impl ServoConfig {
    /// Stepping loop period.
    #[inline]
    pub fn tick(&self) -> Duration {
        Duration::from_micros(self.tick_us as u64)
    }

    /// Idle ticks before release, or `None` when release is disabled.
    #[inline]
    pub fn release_after(&self) -> Option<u32> {
        self.release_when_idle.then_some(self.release_after_ticks)
    }

    /// Validate the servo configuration.
    ///
    /// # Validation Rules
    /// 1. All angles and rates are finite
    /// 2. `travel.min < travel.max` and `min_angle < max_angle`
    /// 3. Safe range and calibration position lie within the travel
    /// 4. `max_slew_per_command > 0`, `max_rate_per_tick > 0`, `tolerance >= 0`
    /// 5. `tick_us > 0`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let values = [
            ("min_angle", self.min_angle),
            ("max_angle", self.max_angle),
            ("max_slew_per_command", self.max_slew_per_command),
            ("max_rate_per_tick", self.max_rate_per_tick),
            ("tolerance", self.tolerance),
            ("calibration_position", self.calibration_position),
            ("travel.min", self.travel.min),
            ("travel.max", self.travel.max),
        ];
        if let Some((name, _)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(invalid(format!("servo.{name} must be finite")));
        }

        if self.travel.min >= self.travel.max {
            return Err(invalid(format!(
                "servo.travel: min ({}) must be below max ({})",
                self.travel.min, self.travel.max
            )));
        }
        if self.min_angle >= self.max_angle {
            return Err(invalid(format!(
                "servo: min_angle ({}) must be below max_angle ({})",
                self.min_angle, self.max_angle
            )));
        }
        if !self.travel.contains(self.min_angle) || !self.travel.contains(self.max_angle) {
            return Err(invalid(format!(
                "servo: safe range [{}, {}] exceeds travel [{}, {}]",
                self.min_angle, self.max_angle, self.travel.min, self.travel.max
            )));
        }
        if !self.travel.contains(self.calibration_position) {
            return Err(invalid(format!(
                "servo: calibration_position {} outside travel",
                self.calibration_position
            )));
        }
        if self.max_slew_per_command <= 0.0 {
            return Err(invalid("servo.max_slew_per_command must be positive".into()));
        }
        if self.max_rate_per_tick <= 0.0 {
            return Err(invalid("servo.max_rate_per_tick must be positive".into()));
        }
        if self.tolerance < 0.0 {
            return Err(invalid("servo.tolerance cannot be negative".into()));
        }
        if self.tick_us == 0 {
            return Err(invalid("servo.tick_us must be greater than 0".into()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::ValidationError(message)
}
