//! Simulation driver.
//!
//! Emulates an actuator with perfect position feedback. Every write is
//! recorded so tests and the bridge's `--simulate` mode can observe the
//! motion profile. A [`SimulationProbe`] shares the recorded state with the
//! caller after the driver has been boxed and moved into the servo task.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use stepgate_common::hal::config::PwmConfig;
use stepgate_common::hal::driver::{HalError, ServoDriver};
use stepgate_common::hal::types::NormalizedPosition;
use tracing::{debug, info};

/// Registry name of the simulation driver.
pub const DRIVER_NAME: &str = "simulation";

/// Factory function to create a simulation driver instance.
pub fn create_driver() -> Box<dyn ServoDriver> {
    Box::new(SimulationDriver::new())
}

#[derive(Debug, Default)]
struct SimulatedServo {
    position: Option<NormalizedPosition>,
    writes: Vec<NormalizedPosition>,
    releases: u32,
    releases_started: u32,
    release_stall: Duration,
    holding: bool,
    fail_writes: bool,
    fail_calibration: bool,
    shut_down: bool,
}

/// Shared view into a [`SimulationDriver`].
#[derive(Debug, Clone, Default)]
pub struct SimulationProbe {
    inner: Arc<Mutex<SimulatedServo>>,
}

impl SimulationProbe {
    /// Every position written so far, oldest first.
    pub fn writes(&self) -> Vec<NormalizedPosition> {
        self.inner.lock().writes.clone()
    }

    /// Most recent write.
    pub fn last_write(&self) -> Option<NormalizedPosition> {
        self.inner.lock().writes.last().copied()
    }

    /// Simulated actuator position (what `calibrate()` reports).
    pub fn position(&self) -> Option<NormalizedPosition> {
        self.inner.lock().position
    }

    /// Place the simulated actuator without recording a write.
    pub fn set_position(&self, position: NormalizedPosition) {
        self.inner.lock().position = Some(position);
    }

    /// Make subsequent writes fail with a communication error.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Make subsequent calibration reads fail with a communication error.
    pub fn fail_calibration(&self, fail: bool) {
        self.inner.lock().fail_calibration = fail;
    }

    /// Make subsequent `release()` calls block for `stall` before completing.
    pub fn stall_release(&self, stall: Duration) {
        self.inner.lock().release_stall = stall;
    }

    /// Number of completed `release()` calls.
    pub fn release_count(&self) -> u32 {
        self.inner.lock().releases
    }

    /// Number of `release()` calls entered, including one still stalling.
    pub fn releases_started(&self) -> u32 {
        self.inner.lock().releases_started
    }

    /// Whether pulses are currently emitted.
    pub fn is_holding(&self) -> bool {
        self.inner.lock().holding
    }

    /// Whether `shutdown()` ran.
    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().shut_down
    }
}

/// Simulation driver implementing the `ServoDriver` trait.
pub struct SimulationDriver {
    version: &'static str,
    initialized: bool,
    probe: SimulationProbe,
}

impl SimulationDriver {
    /// Create a new simulation driver instance.
    pub fn new() -> Self {
        Self::with_probe(SimulationProbe::default())
    }

    /// Create a driver that records into an existing probe.
    pub fn with_probe(probe: SimulationProbe) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            initialized: false,
            probe,
        }
    }

    /// Probe sharing this driver's state.
    pub fn probe(&self) -> SimulationProbe {
        self.probe.clone()
    }
}

impl Default for SimulationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ServoDriver for SimulationDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn init(&mut self, config: &PwmConfig) -> Result<(), HalError> {
        info!(
            "Initializing simulation driver (period={}us, pulse={}..{}us)",
            config.period_us, config.min_pulse_us, config.max_pulse_us
        );
        self.initialized = true;
        Ok(())
    }

    fn write(&mut self, position: NormalizedPosition) -> Result<(), HalError> {
        if !self.initialized {
            return Err(HalError::NotInitialized);
        }
        let mut sim = self.probe.inner.lock();
        if sim.fail_writes {
            return Err(HalError::CommunicationError(
                "simulated write failure".to_string(),
            ));
        }
        sim.position = Some(position);
        sim.writes.push(position);
        sim.holding = true;
        Ok(())
    }

    fn calibrate(&mut self) -> Result<Option<NormalizedPosition>, HalError> {
        if !self.initialized {
            return Err(HalError::NotInitialized);
        }
        let sim = self.probe.inner.lock();
        if sim.fail_calibration {
            return Err(HalError::CommunicationError(
                "simulated calibration failure".to_string(),
            ));
        }
        Ok(sim.position)
    }

    fn release(&mut self) -> Result<(), HalError> {
        if !self.initialized {
            return Err(HalError::NotInitialized);
        }
        let stall = {
            let mut sim = self.probe.inner.lock();
            sim.releases_started += 1;
            sim.release_stall
        };
        if !stall.is_zero() {
            debug!("Simulated release stalling for {:?}", stall);
            thread::sleep(stall);
        }
        let mut sim = self.probe.inner.lock();
        sim.releases += 1;
        sim.holding = false;
        debug!("Simulated servo released");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        if !self.initialized {
            return Ok(());
        }
        let mut sim = self.probe.inner.lock();
        sim.holding = false;
        sim.shut_down = true;
        self.initialized = false;
        info!("Simulation driver shut down after {} writes", sim.writes.len());
        Ok(())
    }
}
