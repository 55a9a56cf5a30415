//! # StepGate HAL Library
//!
//! Servo output drivers behind the `ServoDriver` trait defined in
//! `stepgate_common::hal::driver`.
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - Driver implementations
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌──────────────────┐      ┌──────────────────┐
//! │  ServoController │─────►│   ServoDriver    │─────►│  pulse generator │
//! │  (angle units)   │ 0..1 │  (trait object)  │  ns  │  (sysfs / sim)   │
//! └──────────────────┘      └──────────────────┘      └──────────────────┘
//! ```

#![deny(missing_docs)]

pub mod driver_registry;
pub mod drivers;

pub use crate::driver_registry::DriverRegistry;
pub use crate::drivers::simulation::{SimulationDriver, SimulationProbe};
pub use crate::drivers::sysfs_pwm::SysfsPwmDriver;
