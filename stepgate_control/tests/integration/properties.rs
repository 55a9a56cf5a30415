//! Property tests over the envelope, controller and dispatcher.

use std::time::Instant;

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use stepgate_common::hal::types::NormalizedPosition;
use stepgate_common::servo::ServoConfig;
use stepgate_control::{
    DeviceKey, Dispatcher, EncryptedEnvelope, JsonCommandParser, MotionEnvelope,
    MotionValidator, PipelineError, PositionCommand, RejectKind, ServoController, ServoPhase,
    ServoState, StepOutcome, X25519ChaChaGate, seal,
};

use super::fixtures::{DEVICE_SECRET, InlineServo, command_json, device_public, sim_driver};

fn config(rate: f64) -> ServoConfig {
    ServoConfig {
        max_slew_per_command: 180.0,
        max_rate_per_tick: rate,
        release_when_idle: false,
        ..Default::default()
    }
}

fn controller_at(start: f64, config: &ServoConfig) -> (ServoController, stepgate_hal::SimulationProbe) {
    let (driver, probe) = sim_driver();
    probe.set_position(config.travel.normalize(start));
    let controller = ServoController::new(driver, config).expect("calibrate");
    (controller, probe)
}

fn out_of_range() -> impl Strategy<Value = f64> {
    prop_oneof![
        -1.0e6..-1.0e-6f64,
        (180.0 + 1.0e-6)..1.0e6f64,
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn out_of_range_never_yields_a_target(
        position in out_of_range(),
        current in 0.0..=180.0f64,
    ) {
        let envelope = MotionEnvelope::from_config(&config(1.0));
        let result = envelope.clamp(&PositionCommand { position }, &ServoState::idle_at(current));
        prop_assert!(
            matches!(result, Err(PipelineError::OutOfRange { .. })),
            "{result:?}"
        );
    }

    #[test]
    fn steps_are_monotonic_and_arrive(
        start in 0.0..=180.0f64,
        goal in 0.0..=180.0f64,
        rate in 0.1..20.0f64,
    ) {
        let config = config(rate);
        let (mut controller, _probe) = controller_at(start, &config);
        let from = controller.state().current_position;
        let target = MotionEnvelope::from_config(&config)
            .clamp(&PositionCommand { position: goal }, &controller.state())
            .expect("in range");
        controller.begin_move(target, Instant::now()).expect("idle");

        let direction = (goal - from).signum();
        let budget = ((goal - from).abs() / rate).ceil() as usize + 2;
        let mut previous = from;
        let mut arrived = false;
        for _ in 0..budget {
            let outcome = controller.step(Instant::now());
            let position = controller.state().current_position;
            prop_assert!((position - previous).abs() <= rate + 1e-9);
            prop_assert!((position - previous) * direction >= -1e-9, "moved away from target");
            prop_assert!((goal - position) * direction >= -config.tolerance, "overshoot");
            previous = position;
            if matches!(outcome, StepOutcome::Arrived { .. }) {
                arrived = true;
                break;
            }
        }

        prop_assert!(arrived);
        prop_assert_eq!(controller.state().phase, ServoPhase::Idle);
        prop_assert!((controller.state().current_position - goal).abs() <= config.tolerance);
    }

    #[test]
    fn tampered_envelopes_never_move_the_servo(
        seed in any::<u64>(),
        position in 0.0..=180.0f64,
        flip_key in any::<bool>(),
        index in any::<usize>(),
        bit in 0u8..8,
    ) {
        let config = config(1.0);
        let (controller, probe) = controller_at(0.0, &config);
        let dispatcher = Dispatcher::new(
            X25519ChaChaGate::new(DeviceKey::from_bytes(DEVICE_SECRET)),
            JsonCommandParser,
            MotionEnvelope::from_config(&config),
            InlineServo::new(controller),
        );
        let before = dispatcher.servo().controller.borrow().state();
        let writes = probe.writes().len();

        let mut rng = StdRng::seed_from_u64(seed);
        let sealed = seal(
            &device_public(DEVICE_SECRET),
            command_json(position).as_bytes(),
            &mut rng,
        )
        .expect("seal");
        let mut public_key = sealed.public_key().to_vec();
        let mut payload = sealed.payload().to_vec();
        let bytes = if flip_key { &mut public_key } else { &mut payload };
        let at = index % bytes.len();
        bytes[at] ^= 1 << bit;

        let outcome = dispatcher.handle(&EncryptedEnvelope::new(public_key, payload));
        prop_assert_eq!(outcome.reject_kind(), Some(RejectKind::Authentication));
        prop_assert_eq!(dispatcher.servo().controller.borrow().state(), before);
        prop_assert_eq!(probe.writes().len(), writes);
    }
}

#[test]
fn start_position_comes_from_feedback() {
    let config = config(1.0);
    let (controller, _probe) = controller_at(90.0, &config);
    assert!((controller.state().current_position - 90.0).abs() < 1e-9);
    assert_eq!(NormalizedPosition::saturating(0.5), config.travel.normalize(90.0));
}
