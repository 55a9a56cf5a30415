//! Error taxonomy.
//!
//! [`PipelineError`] is the tagged result of every pipeline stage. The first
//! six kinds are ordinary rejections recovered at the dispatcher; only
//! `HardwareFault` reflects a persistent controller condition.
//!
//! [`ControlError`] is the controller's own error type, mapped into
//! `PipelineError` at the dispatcher boundary.

use stepgate_common::hal::driver::HalError;
use thiserror::Error;

use crate::state::FaultReason;

/// Rejection of one inbound command.
///
/// Messages never contain plaintext or key material.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Key malformed or AEAD verification failed.
    #[error("authentication failed: {0}")]
    Authentication(&'static str),

    /// Ciphertext cannot be decoded under the key/algorithm.
    #[error("decryption failed: {0}")]
    Decryption(&'static str),

    /// Plaintext or wire envelope does not match the schema.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// Requested position outside the safe range.
    #[error("position {position} outside safe range [{min}, {max}]")]
    OutOfRange {
        /// Requested position.
        position: f64,
        /// Lower bound of the safe range.
        min: f64,
        /// Upper bound of the safe range.
        max: f64,
    },

    /// Requested change larger than a single command may make.
    #[error("slew {delta:.3} exceeds per-command maximum {max}")]
    ExcessiveSlew {
        /// `|target - current|`.
        delta: f64,
        /// Configured maximum.
        max: f64,
    },

    /// A motion is already in flight.
    #[error("servo busy: motion in flight")]
    Busy,

    /// Controller faulted or unreachable.
    #[error("hardware fault: {0}")]
    HardwareFault(String),
}

/// Number of [`RejectKind`]s.
pub const REJECT_KIND_COUNT: usize = 7;

/// Fieldless projection of [`PipelineError`] used for logs and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectKind {
    /// See [`PipelineError::Authentication`].
    Authentication,
    /// See [`PipelineError::Decryption`].
    Decryption,
    /// See [`PipelineError::MalformedCommand`].
    MalformedCommand,
    /// See [`PipelineError::OutOfRange`].
    OutOfRange,
    /// See [`PipelineError::ExcessiveSlew`].
    ExcessiveSlew,
    /// See [`PipelineError::Busy`].
    Busy,
    /// See [`PipelineError::HardwareFault`].
    HardwareFault,
}

impl RejectKind {
    /// Every kind, in taxonomy order.
    pub const ALL: [RejectKind; REJECT_KIND_COUNT] = [
        RejectKind::Authentication,
        RejectKind::Decryption,
        RejectKind::MalformedCommand,
        RejectKind::OutOfRange,
        RejectKind::ExcessiveSlew,
        RejectKind::Busy,
        RejectKind::HardwareFault,
    ];

    /// Stable label for structured logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            RejectKind::Authentication => "authentication",
            RejectKind::Decryption => "decryption",
            RejectKind::MalformedCommand => "malformed_command",
            RejectKind::OutOfRange => "out_of_range",
            RejectKind::ExcessiveSlew => "excessive_slew",
            RejectKind::Busy => "busy",
            RejectKind::HardwareFault => "hardware_fault",
        }
    }

    /// Position in [`RejectKind::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for RejectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    /// Kind of this rejection.
    pub fn kind(&self) -> RejectKind {
        match self {
            PipelineError::Authentication(_) => RejectKind::Authentication,
            PipelineError::Decryption(_) => RejectKind::Decryption,
            PipelineError::MalformedCommand(_) => RejectKind::MalformedCommand,
            PipelineError::OutOfRange { .. } => RejectKind::OutOfRange,
            PipelineError::ExcessiveSlew { .. } => RejectKind::ExcessiveSlew,
            PipelineError::Busy => RejectKind::Busy,
            PipelineError::HardwareFault(_) => RejectKind::HardwareFault,
        }
    }

    /// The sender may reasonably try again once the current motion ends.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Busy)
    }

    /// Whether this reflects a persistent controller condition.
    pub fn is_fault(&self) -> bool {
        matches!(self, PipelineError::HardwareFault(_))
    }
}

/// Errors raised by the servo controller and its task.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    /// A motion is in flight.
    #[error("servo busy: motion to {target:.3} in flight")]
    Busy {
        /// In-flight target.
        target: f64,
    },

    /// Controller is faulted and needs an operator reset.
    #[error("servo faulted: {0}")]
    Faulted(FaultReason),

    /// Operation not valid in the current phase.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    /// Driver failure outside the stepping loop (calibration, shutdown).
    #[error(transparent)]
    Hardware(#[from] HalError),

    /// Servo task stopped or did not answer in time.
    #[error("servo task unavailable")]
    Unavailable,
}

impl From<ControlError> for PipelineError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::Busy { .. } => PipelineError::Busy,
            other => PipelineError::HardwareFault(other.to_string()),
        }
    }
}
