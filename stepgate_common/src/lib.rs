//! StepGate Common Library
//!
//! Shared constants, configuration loading and the servo driver interface
//! used by every StepGate workspace crate.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading trait and the top-level `StepGateConfig`
//! - [`consts`] - Workspace-wide defaults
//! - [`hal`] - Servo driver trait, PWM configuration, normalized positions
//! - [`mqtt`] - Broker connection settings
//! - [`servo`] - Motion limits and physical travel of the actuator
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust,no_run
//! use stepgate_common::config::{ConfigLoader, StepGateConfig};
//! use std::path::Path;
//!
//! let config = StepGateConfig::load(Path::new("stepgate.toml")).unwrap();
//! config.validate().unwrap();
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod mqtt;
pub mod prelude;
pub mod servo;
