//! Servo driver implementations.
//!
//! - [`simulation`] - In-memory driver for development and testing
//! - [`sysfs_pwm`] - Linux sysfs PWM output (Raspberry Pi hardware PWM)
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `ServoDriver` trait from `stepgate_common::hal::driver`
//! 3. Register the driver in [`register_all_drivers`]

pub mod simulation;
pub mod sysfs_pwm;

use crate::driver_registry::DriverRegistry;

/// Register every built-in driver.
pub fn register_all_drivers(registry: &mut DriverRegistry) {
    registry.register(simulation::DRIVER_NAME, simulation::create_driver);
    registry.register(sysfs_pwm::DRIVER_NAME, sysfs_pwm::create_driver);
}
