//! MotionEnvelope: range and slew validation.
//!
//! A [`SafeTarget`] can only be obtained from [`MotionValidator::clamp`], so
//! every motion the controller executes has passed the range check.
//!
//! Checks run in order:
//! 1. `min_angle <= position <= max_angle` (non-finite is out of range)
//! 2. `|position - current_position| <= max_slew_per_command`
//!
//! Both are rejections; the command is never clamped into range.

use stepgate_common::servo::ServoConfig;

use crate::command::PositionCommand;
use crate::error::PipelineError;
use crate::state::ServoState;

/// Position that passed envelope validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafeTarget {
    position: f64,
}

impl SafeTarget {
    /// Target angle in degrees.
    #[inline]
    pub const fn position(self) -> f64 {
        self.position
    }
}

/// Limits applied to every command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionLimits {
    /// Lowest accepted angle.
    pub min_angle: f64,
    /// Highest accepted angle.
    pub max_angle: f64,
    /// Largest accepted `|target - current|`.
    pub max_slew_per_command: f64,
}

impl From<&ServoConfig> for MotionLimits {
    fn from(config: &ServoConfig) -> Self {
        Self {
            min_angle: config.min_angle,
            max_angle: config.max_angle,
            max_slew_per_command: config.max_slew_per_command,
        }
    }
}

/// Validates a command against the actuator's limits.
pub trait MotionValidator {
    /// Validate `cmd` against `state`. Pure; `state` is only read.
    fn clamp(&self, cmd: &PositionCommand, state: &ServoState) -> Result<SafeTarget, PipelineError>;
}

/// Default validator.
#[derive(Debug, Clone, Copy)]
pub struct MotionEnvelope {
    limits: MotionLimits,
}

impl MotionEnvelope {
    /// Envelope with explicit limits.
    pub const fn new(limits: MotionLimits) -> Self {
        Self { limits }
    }

    /// Envelope for the `[servo]` section.
    pub fn from_config(config: &ServoConfig) -> Self {
        Self::new(MotionLimits::from(config))
    }

    /// Active limits.
    pub const fn limits(&self) -> &MotionLimits {
        &self.limits
    }
}

impl MotionValidator for MotionEnvelope {
    fn clamp(&self, cmd: &PositionCommand, state: &ServoState) -> Result<SafeTarget, PipelineError> {
        let MotionLimits {
            min_angle,
            max_angle,
            max_slew_per_command,
        } = self.limits;
        let position = cmd.position;

        // NaN fails the range test.
        if !(min_angle..=max_angle).contains(&position) {
            return Err(PipelineError::OutOfRange {
                position,
                min: min_angle,
                max: max_angle,
            });
        }

        let delta = (position - state.current_position).abs();
        if delta > max_slew_per_command {
            return Err(PipelineError::ExcessiveSlew {
                delta,
                max: max_slew_per_command,
            });
        }

        Ok(SafeTarget { position })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
