//! Shared rigs for the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::thread;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use stepgate_common::hal::config::PwmConfig;
use stepgate_common::hal::driver::ServoDriver;
use stepgate_common::servo::ServoConfig;
use stepgate_control::{
    BridgeDispatcher, ControlError, DeviceKey, Dispatcher, EncryptedEnvelope, JsonCommandParser,
    MotionEnvelope, SafeTarget, ServoController, ServoPhase, ServoPort, ServoRuntime, ServoState,
    ServoTask, TickStats, X25519ChaChaGate, seal,
};
use stepgate_hal::{SimulationDriver, SimulationProbe};

pub const DEVICE_SECRET: [u8; 32] = [0x42; 32];
pub const OTHER_SECRET: [u8; 32] = [0x24; 32];
pub const TICK: Duration = Duration::from_millis(1);

pub fn sim_driver() -> (Box<SimulationDriver>, SimulationProbe) {
    let mut driver = SimulationDriver::new();
    driver.init(&PwmConfig::default()).expect("simulation init");
    let probe = driver.probe();
    (Box::new(driver), probe)
}

pub fn device_public(secret: [u8; 32]) -> [u8; 32] {
    DeviceKey::from_bytes(secret).public_key()
}

pub fn command_json(position: f64) -> String {
    format!(r#"{{"position":{position}}}"#)
}

/// Position command sealed for the test device.
pub fn sealed_command(position: f64) -> EncryptedEnvelope {
    seal(
        &device_public(DEVICE_SECRET),
        command_json(position).as_bytes(),
        &mut StdRng::seed_from_u64(position.to_bits()),
    )
    .expect("seal")
}

/// Full pipeline with the servo on its own thread.
pub struct Rig {
    pub dispatcher: BridgeDispatcher,
    pub runtime: ServoRuntime,
    pub probe: SimulationProbe,
    rng: StdRng,
}

impl Rig {
    pub fn new(config: &ServoConfig) -> Self {
        let (driver, probe) = sim_driver();
        let controller = ServoController::new(driver, config).expect("calibrate");
        let runtime = ServoTask::spawn(controller, TICK).expect("spawn servo task");
        let dispatcher = Dispatcher::new(
            X25519ChaChaGate::new(DeviceKey::from_bytes(DEVICE_SECRET)),
            JsonCommandParser,
            MotionEnvelope::from_config(config),
            runtime.handle(),
        );
        Self {
            dispatcher,
            runtime,
            probe,
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }

    /// Seal `plaintext` for this rig's device.
    pub fn sealed(&mut self, plaintext: &str) -> EncryptedEnvelope {
        seal(
            &device_public(DEVICE_SECRET),
            plaintext.as_bytes(),
            &mut self.rng,
        )
        .expect("seal")
    }

    /// Seal `plaintext` for a different device.
    pub fn sealed_for_other(&mut self, plaintext: &str) -> EncryptedEnvelope {
        seal(
            &device_public(OTHER_SECRET),
            plaintext.as_bytes(),
            &mut self.rng,
        )
        .expect("seal")
    }

    pub fn command(&mut self, position: f64) -> EncryptedEnvelope {
        self.sealed(&command_json(position))
    }

    pub fn state(&self) -> ServoState {
        self.dispatcher.servo().state().expect("servo task alive")
    }

    pub fn wait_for_phase(&self, phase: ServoPhase) -> ServoState {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let state = self.state();
            if state.phase == phase {
                return state;
            }
            assert!(Instant::now() < deadline, "servo stuck in {:?}", state.phase);
            thread::sleep(TICK);
        }
    }

    pub fn shutdown(self) -> TickStats {
        self.runtime.shutdown().expect("clean shutdown")
    }
}

/// Controller driven inline, for property tests that cannot afford a thread
/// per case.
pub struct InlineServo {
    pub controller: RefCell<ServoController>,
}

impl InlineServo {
    pub fn new(controller: ServoController) -> Self {
        Self {
            controller: RefCell::new(controller),
        }
    }
}

impl ServoPort for InlineServo {
    fn state(&self) -> Result<ServoState, ControlError> {
        Ok(self.controller.borrow().state())
    }

    fn begin_move(&self, target: SafeTarget) -> Result<(), ControlError> {
        self.controller
            .borrow_mut()
            .begin_move(target, Instant::now())
    }
}
