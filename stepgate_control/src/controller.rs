//! ServoController: the state machine that owns the actuator.
//!
//! ```text
//!            begin_move              arrived / cancel honored
//!   Idle ───────────────▶ Moving ─────────────────────────────▶ Idle
//!    │                      │
//!    └──── fault ───▶ Faulted ◀── fault / write failure ─┘
//!                       │
//!                       └── reset (fresh calibration) ──▶ Idle
//! ```
//!
//! Each `step` moves the actuator by at most `max_rate_per_tick` toward the
//! target and writes the result to the driver. The path is monotonic and
//! never overshoots: the final tick lands exactly on the target once the
//! remaining distance is within one tick's travel.

use std::time::{Duration, Instant};

use stepgate_common::hal::driver::{HalError, ServoDriver};
use stepgate_common::servo::{ServoConfig, TravelRange};
use tracing::{debug, error, info, warn};

use crate::envelope::SafeTarget;
use crate::error::ControlError;
use crate::state::{FaultReason, ServoPhase, ServoState};

/// Result of one [`ServoController::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Idle, nothing written.
    Resting,
    /// Idle timeout reached; holding pulses stopped.
    Released,
    /// Moved one tick toward the target.
    Advanced {
        /// Position written this tick.
        position: f64,
    },
    /// Reached the target; controller is `Idle`.
    Arrived {
        /// Final position.
        position: f64,
        /// Time since `begin_move`.
        elapsed: Duration,
        /// Ticks spent moving.
        ticks: u32,
    },
    /// Pending cancel honored; controller is `Idle` where it stopped.
    Cancelled {
        /// Position at which motion halted.
        position: f64,
    },
    /// Driver failed this tick; controller is `Faulted`.
    Faulted(FaultReason),
    /// Controller was already `Faulted`; nothing written.
    Halted,
}

#[derive(Debug, Clone, Copy)]
struct Motion {
    target: SafeTarget,
    started_at: Instant,
    ticks: u32,
}

/// Motion parameters the controller needs from `[servo]`.
#[derive(Debug, Clone, Copy)]
struct Profile {
    travel: TravelRange,
    max_rate_per_tick: f64,
    tolerance: f64,
    calibration_position: f64,
    release_after: Option<u32>,
}

impl From<&ServoConfig> for Profile {
    fn from(config: &ServoConfig) -> Self {
        Self {
            travel: config.travel,
            max_rate_per_tick: config.max_rate_per_tick,
            tolerance: config.tolerance,
            calibration_position: config.calibration_position,
            release_after: config.release_after(),
        }
    }
}

/// Owner of [`ServoState`] and the servo driver.
pub struct ServoController {
    driver: Box<dyn ServoDriver>,
    profile: Profile,
    state: ServoState,
    motion: Option<Motion>,
    fault: Option<FaultReason>,
    cancel_requested: bool,
    idle_ticks: u32,
    released: bool,
}

impl ServoController {
    /// Take ownership of an initialized driver and calibrate.
    ///
    /// # Errors
    /// Returns the driver error if the calibration read or write fails.
    pub fn new(mut driver: Box<dyn ServoDriver>, config: &ServoConfig) -> Result<Self, HalError> {
        let profile = Profile::from(config);
        let position = calibrate(driver.as_mut(), &profile)?;
        info!(
            driver = driver.name(),
            position, "Servo controller calibrated"
        );
        Ok(Self {
            driver,
            profile,
            state: ServoState::idle_at(position),
            motion: None,
            fault: None,
            cancel_requested: false,
            idle_ticks: 0,
            released: false,
        })
    }

    /// Copied snapshot of the state.
    #[inline]
    pub fn state(&self) -> ServoState {
        self.state
    }

    /// In-flight target, if moving.
    #[inline]
    pub fn target(&self) -> Option<SafeTarget> {
        self.motion.map(|m| m.target)
    }

    /// Why the controller is faulted.
    #[inline]
    pub fn fault_reason(&self) -> Option<&FaultReason> {
        self.fault.as_ref()
    }

    /// Whether a cancel waits for the next tick.
    #[inline]
    pub fn is_cancel_pending(&self) -> bool {
        self.cancel_requested
    }

    /// Start a motion toward `target`. Valid only from `Idle`.
    ///
    /// # Errors
    /// - `Busy` while moving; the in-flight target is kept
    /// - `Faulted` while faulted
    pub fn begin_move(&mut self, target: SafeTarget, now: Instant) -> Result<(), ControlError> {
        match self.state.phase {
            ServoPhase::Idle => {
                self.motion = Some(Motion {
                    target,
                    started_at: now,
                    ticks: 0,
                });
                self.state.phase = ServoPhase::Moving;
                self.cancel_requested = false;
                self.idle_ticks = 0;
                debug!(
                    from = self.state.current_position,
                    to = target.position(),
                    "Motion started"
                );
                Ok(())
            }
            ServoPhase::Moving => Err(ControlError::Busy {
                target: self.motion.map_or(f64::NAN, |m| m.target.position()),
            }),
            ServoPhase::Faulted => Err(ControlError::Faulted(self.current_fault())),
        }
    }

    /// Advance one tick.
    pub fn step(&mut self, now: Instant) -> StepOutcome {
        match self.state.phase {
            ServoPhase::Faulted => StepOutcome::Halted,
            ServoPhase::Idle => self.rest(),
            ServoPhase::Moving => self.advance(now),
        }
    }

    /// Ask the in-flight motion to halt at the next tick.
    ///
    /// # Errors
    /// `InvalidTransition` unless moving.
    pub fn cancel(&mut self) -> Result<(), ControlError> {
        if self.state.phase != ServoPhase::Moving {
            return Err(ControlError::InvalidTransition("cancel: no motion in flight"));
        }
        self.cancel_requested = true;
        Ok(())
    }

    /// Enter `Faulted` from any phase. The first reason is kept until reset.
    pub fn fault(&mut self, reason: FaultReason) {
        if self.fault.is_none() {
            error!(reason = %reason, position = self.state.current_position, "Servo faulted");
            self.fault = Some(reason);
        } else {
            warn!(reason = %reason, "Additional fault while already faulted");
        }
        self.state.phase = ServoPhase::Faulted;
        self.motion = None;
        self.cancel_requested = false;
    }

    /// Operator reset: recalibrate and return to `Idle`.
    ///
    /// # Errors
    /// - `InvalidTransition` unless faulted
    /// - `Hardware` if calibration fails; the controller stays faulted
    pub fn reset(&mut self) -> Result<f64, ControlError> {
        if self.state.phase != ServoPhase::Faulted {
            return Err(ControlError::InvalidTransition("reset: controller not faulted"));
        }
        match calibrate(self.driver.as_mut(), &self.profile) {
            Ok(position) => {
                info!(
                    position,
                    previous = ?self.fault,
                    "Servo reset after fault"
                );
                self.state = ServoState::idle_at(position);
                self.fault = None;
                self.idle_ticks = 0;
                self.released = false;
                Ok(position)
            }
            Err(e) => {
                warn!(error = %e, "Calibration failed during reset");
                self.fault = Some(FaultReason::Calibration(e.to_string()));
                Err(ControlError::Hardware(e))
            }
        }
    }

    /// Drop any motion, release and shut the driver down.
    pub fn shutdown(&mut self) -> Result<(), HalError> {
        self.motion = None;
        self.cancel_requested = false;
        if self.state.phase == ServoPhase::Moving {
            self.state.phase = ServoPhase::Idle;
        }
        if let Err(e) = self.driver.release() {
            warn!(error = %e, "Release failed during shutdown");
        }
        self.driver.shutdown()
    }

    fn current_fault(&self) -> FaultReason {
        self.fault
            .clone()
            .unwrap_or_else(|| FaultReason::External("unspecified".to_string()))
    }

    fn rest(&mut self) -> StepOutcome {
        let Some(limit) = self.profile.release_after else {
            return StepOutcome::Resting;
        };
        if self.released {
            return StepOutcome::Resting;
        }
        self.idle_ticks = self.idle_ticks.saturating_add(1);
        if self.idle_ticks < limit {
            return StepOutcome::Resting;
        }
        match self.driver.release() {
            Ok(()) => {
                self.released = true;
                debug!(position = self.state.current_position, "Servo released");
                StepOutcome::Released
            }
            Err(e) => self.fault_on_driver(e),
        }
    }

    fn advance(&mut self, now: Instant) -> StepOutcome {
        let Some(mut motion) = self.motion else {
            // Moving without a motion cannot happen; settle rather than panic.
            self.state.phase = ServoPhase::Idle;
            return StepOutcome::Resting;
        };

        if self.cancel_requested {
            self.finish();
            info!(
                position = self.state.current_position,
                target = motion.target.position(),
                "Motion cancelled"
            );
            return StepOutcome::Cancelled {
                position: self.state.current_position,
            };
        }

        let target = motion.target.position();
        let next = next_position(
            self.state.current_position,
            target,
            self.profile.max_rate_per_tick,
        );
        if let Err(e) = self.driver.write(self.profile.travel.normalize(next)) {
            return self.fault_on_driver(e);
        }

        self.state.current_position = next;
        self.released = false;
        motion.ticks += 1;

        if (target - next).abs() <= self.profile.tolerance {
            let elapsed = now.saturating_duration_since(motion.started_at);
            self.finish();
            info!(
                position = next,
                ticks = motion.ticks,
                elapsed_ms = elapsed.as_millis() as u64,
                "Motion complete"
            );
            return StepOutcome::Arrived {
                position: next,
                elapsed,
                ticks: motion.ticks,
            };
        }

        self.motion = Some(motion);
        StepOutcome::Advanced { position: next }
    }

    fn finish(&mut self) {
        self.motion = None;
        self.cancel_requested = false;
        self.idle_ticks = 0;
        self.state.phase = ServoPhase::Idle;
    }

    fn fault_on_driver(&mut self, err: HalError) -> StepOutcome {
        let reason = FaultReason::Hardware(err.to_string());
        self.fault(reason.clone());
        StepOutcome::Faulted(reason)
    }
}

impl std::fmt::Debug for ServoController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServoController")
            .field("driver", &self.driver.name())
            .field("state", &self.state)
            .field("target", &self.target())
            .field("fault", &self.fault)
            .finish()
    }
}

/// Bounded-rate step from `current` toward `target`.
#[inline]
pub fn next_position(current: f64, target: f64, max_rate: f64) -> f64 {
    let remaining = target - current;
    if remaining.abs() <= max_rate {
        target
    } else {
        current + max_rate.copysign(remaining)
    }
}

/// Fresh calibration: trust feedback if the driver has it, otherwise drive
/// to the configured calibration position and assume it.
fn calibrate(driver: &mut dyn ServoDriver, profile: &Profile) -> Result<f64, HalError> {
    match driver.calibrate()? {
        Some(position) => Ok(profile.travel.denormalize(position)),
        None => {
            driver.write(profile.travel.normalize(profile.calibration_position))?;
            Ok(profile.calibration_position)
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
