//! Servo hardware abstraction.
//!
//! - [`driver`] - `ServoDriver` trait and `HalError`
//! - [`config`] - `[pwm]` configuration and pulse-width mapping
//! - [`types`] - `NormalizedPosition`

pub mod config;
pub mod driver;
pub mod types;
