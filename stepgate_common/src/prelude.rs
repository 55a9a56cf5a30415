//! Prelude module for common re-exports.
//!
//! ```rust
//! use stepgate_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    CipherConfig, ConfigError, ConfigLoader, LogLevel, SharedConfig, StepGateConfig,
};
pub use crate::mqtt::MqttConfig;
pub use crate::servo::{ServoConfig, TravelRange};

// ─── Hardware ───────────────────────────────────────────────────────
pub use crate::hal::config::PwmConfig;
pub use crate::hal::driver::{DriverFactory, HalError, ServoDriver};
pub use crate::hal::types::NormalizedPosition;
