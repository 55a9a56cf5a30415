//! Servo driver trait and error types.
//!
//! This module defines:
//! - `ServoDriver` trait - Interface for pluggable servo output backends
//! - `HalError` enum - Error types for driver operations
//! - `DriverFactory` type alias - Factory function type

use crate::hal::config::PwmConfig;
use crate::hal::types::NormalizedPosition;
use thiserror::Error;

/// Error types for driver operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    /// Driver initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Hardware communication error
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Operation issued before `init()`
    #[error("Driver not initialized")]
    NotInitialized,
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn ServoDriver>;

/// Interface between the servo controller and the pulse generator.
///
/// The controller only ever speaks in [`NormalizedPosition`]s; the driver
/// owns the translation to a pulse width.
///
/// # Lifecycle
///
/// 1. `init()` - Called once before the stepping loop starts
/// 2. `calibrate()` - Called at startup and on operator reset
/// 3. `write()` - Called once per tick while a motion is in flight
/// 4. `release()` - Called when the actuator rests
/// 5. `shutdown()` - Called when the servo task stops
///
/// # Timing Contracts
///
/// | Operation | Max Duration | Constraint |
/// |-----------|--------------|------------|
/// | `init()` | 1 second | None (before loop) |
/// | `write()` | tick period | **HARD** |
/// | `release()` | tick period | **HARD** |
/// | `shutdown()` | 1 second | None (after loop) |
pub trait ServoDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation", "sysfs_pwm").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Initialize the driver with the `[pwm]` configuration.
    ///
    /// # Errors
    /// Return `HalError::InitFailed` if the output cannot be prepared.
    fn init(&mut self, config: &PwmConfig) -> Result<(), HalError>;

    /// Emit the pulse width for `position`.
    fn write(&mut self, position: NormalizedPosition) -> Result<(), HalError>;

    /// Fresh calibration read: position feedback, if the hardware has any.
    ///
    /// Open-loop servos return `Ok(None)`; the controller then drives the
    /// actuator to its configured calibration position instead.
    fn calibrate(&mut self) -> Result<Option<NormalizedPosition>, HalError> {
        Ok(None)
    }

    /// Stop emitting holding pulses. The actuator keeps its last position.
    fn release(&mut self) -> Result<(), HalError> {
        Ok(())
    }

    /// Graceful shutdown of the driver.
    fn shutdown(&mut self) -> Result<(), HalError>;
}
