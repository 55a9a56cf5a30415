//! Servo state snapshot types.

/// Controller phase.
///
/// `Idle ⇄ Moving`, any → `Faulted`, `Faulted → Idle` only via operator reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServoPhase {
    /// At rest, ready for a motion.
    #[default]
    Idle,
    /// Stepping toward a target.
    Moving,
    /// Halted on a hardware fault; needs a reset.
    Faulted,
}

impl ServoPhase {
    /// Stable label for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            ServoPhase::Idle => "idle",
            ServoPhase::Moving => "moving",
            ServoPhase::Faulted => "faulted",
        }
    }
}

impl std::fmt::Display for ServoPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copied view of the controller's state.
///
/// Only the controller mutates the original; everything else sees copies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoState {
    /// Last position written to (or calibrated from) the actuator, in degrees.
    pub current_position: f64,
    /// Current phase.
    pub phase: ServoPhase,
}

impl ServoState {
    /// Idle state at `position`.
    pub const fn idle_at(position: f64) -> Self {
        Self {
            current_position: position,
            phase: ServoPhase::Idle,
        }
    }
}

/// Why the controller entered `Faulted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultReason {
    /// Driver write or release failed during stepping.
    Hardware(String),
    /// Calibration read failed on reset.
    Calibration(String),
    /// Raised from outside the controller (operator, supervisor).
    External(String),
}

impl std::fmt::Display for FaultReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultReason::Hardware(msg) => write!(f, "hardware: {msg}"),
            FaultReason::Calibration(msg) => write!(f, "calibration: {msg}"),
            FaultReason::External(msg) => write!(f, "external: {msg}"),
        }
    }
}
