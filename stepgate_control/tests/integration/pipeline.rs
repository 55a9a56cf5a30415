//! Integration test: encrypted command to servo motion.
//!
//! Covers the end-to-end scenarios:
//! 1. Valid command moves the servo Idle → Moving → Idle
//! 2. Every rejection kind leaves position, phase and driver untouched
//! 3. Busy while moving, idempotent replay, fault and reset

use std::thread;
use std::time::{Duration, Instant};

use stepgate_common::servo::ServoConfig;
use stepgate_control::{
    DeviceKey, DispatchOutcome, Dispatcher, FaultReason, JsonCommandParser, MotionEnvelope,
    MotionValidator, PipelineError, PositionCommand, RejectKind, SafeTarget, ServoController,
    ServoPhase, ServoPort, ServoState, ServoTask, X25519ChaChaGate,
};
use stepgate_hal::SimulationProbe;

use super::fixtures::{DEVICE_SECRET, Rig, TICK, command_json, sealed_command, sim_driver};

// ── Helpers ─────────────────────────────────────────────────────────

fn config() -> ServoConfig {
    ServoConfig {
        max_slew_per_command: 180.0,
        ..Default::default()
    }
}

/// Validates only once the servo task is blocked in a stalled release, so the
/// state read succeeds and `begin_move` meets an unresponsive task.
struct AfterReleaseStalls {
    inner: MotionEnvelope,
    probe: SimulationProbe,
}

impl MotionValidator for AfterReleaseStalls {
    fn clamp(&self, cmd: &PositionCommand, state: &ServoState) -> Result<SafeTarget, PipelineError> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.probe.releases_started() == 0 && Instant::now() < deadline {
            thread::sleep(TICK);
        }
        self.inner.clamp(cmd, state)
    }
}

fn assert_untouched(rig: &Rig, before: ServoState, writes_before: usize) {
    assert_eq!(rig.state(), before);
    assert_eq!(rig.probe.writes().len(), writes_before);
}

// ── Tests ───────────────────────────────────────────────────────────

#[test]
fn valid_command_moves_idle_moving_idle() {
    let mut rig = Rig::new(&config());
    assert_eq!(rig.state(), ServoState::idle_at(0.0));

    let envelope = rig.command(90.0);
    let outcome = rig.dispatcher.handle(&envelope);
    assert!(outcome.is_accepted(), "{outcome:?}");
    assert_eq!(rig.state().phase, ServoPhase::Moving);

    let settled = rig.wait_for_phase(ServoPhase::Idle);
    assert!((settled.current_position - 90.0).abs() <= config().tolerance);
    assert!((rig.probe.last_write().unwrap().value() - 0.5).abs() < 1e-3);
    assert_eq!(rig.dispatcher.stats().accepted, 1);
    rig.shutdown();
}

#[test]
fn wrong_device_key_is_authentication_failure() {
    let mut rig = Rig::new(&config());
    let before = rig.state();
    let writes = rig.probe.writes().len();

    let envelope = rig.sealed_for_other(&command_json(90.0));
    let outcome = rig.dispatcher.handle(&envelope);
    assert_eq!(outcome.reject_kind(), Some(RejectKind::Authentication));
    assert_untouched(&rig, before, writes);
    rig.shutdown();
}

#[test]
fn out_of_range_position_rejected() {
    let mut rig = Rig::new(&config());
    let before = rig.state();
    let writes = rig.probe.writes().len();

    let envelope = rig.command(500.0);
    assert_eq!(
        rig.dispatcher.handle(&envelope),
        DispatchOutcome::Rejected(PipelineError::OutOfRange {
            position: 500.0,
            min: 0.0,
            max: 180.0,
        })
    );
    assert_untouched(&rig, before, writes);
    rig.shutdown();
}

#[test]
fn missing_position_is_malformed() {
    let mut rig = Rig::new(&config());
    let before = rig.state();
    let writes = rig.probe.writes().len();

    for text in [r#"{}"#, r#"{"angle":90}"#, r#"{"position":90,"speed":3}"#, "[90]"] {
        let envelope = rig.sealed(text);
        let outcome = rig.dispatcher.handle(&envelope);
        assert_eq!(outcome.reject_kind(), Some(RejectKind::MalformedCommand), "{text}");
    }
    assert_untouched(&rig, before, writes);
    assert_eq!(
        rig.dispatcher.stats().rejected(RejectKind::MalformedCommand),
        4
    );
    rig.shutdown();
}

#[test]
fn excessive_slew_rejected() {
    let mut rig = Rig::new(&ServoConfig {
        max_slew_per_command: 30.0,
        ..Default::default()
    });
    let before = rig.state();
    let writes = rig.probe.writes().len();

    let envelope = rig.command(90.0);
    let outcome = rig.dispatcher.handle(&envelope);
    assert_eq!(outcome.reject_kind(), Some(RejectKind::ExcessiveSlew));
    assert_untouched(&rig, before, writes);
    rig.shutdown();
}

#[test]
fn wire_round_trip_and_tampering() {
    let mut rig = Rig::new(&config());
    let wire = rig.command(20.0).to_wire().unwrap();
    assert!(rig.dispatcher.handle_wire(wire.as_bytes()).is_accepted());
    rig.wait_for_phase(ServoPhase::Idle);

    // Flip one ciphertext nibble after the nonce.
    let mut tampered = rig.command(40.0).to_wire().unwrap().into_bytes();
    let at = tampered.len() - 10;
    tampered[at] = if tampered[at] == b'0' { b'1' } else { b'0' };
    let before = rig.state();
    let outcome = rig.dispatcher.handle_wire(&tampered);
    assert_eq!(outcome.reject_kind(), Some(RejectKind::Authentication));
    assert_eq!(rig.state(), before);
    rig.shutdown();
}

#[test]
fn second_command_while_moving_is_busy() {
    let mut rig = Rig::new(&config());
    let first = rig.command(180.0);
    let second = rig.command(10.0);

    assert!(rig.dispatcher.handle(&first).is_accepted());
    match rig.dispatcher.handle(&second) {
        DispatchOutcome::Rejected(err) => {
            assert_eq!(err, PipelineError::Busy);
            assert!(err.is_retryable());
        }
        other => panic!("expected busy, got {other:?}"),
    }

    let snapshot = rig.runtime.handle().snapshot().unwrap();
    assert_eq!(snapshot.target, Some(180.0));
    let settled = rig.wait_for_phase(ServoPhase::Idle);
    assert!((settled.current_position - 180.0).abs() <= config().tolerance);
    rig.shutdown();
}

#[test]
fn replayed_envelope_is_a_no_op_move() {
    let mut rig = Rig::new(&config());
    let envelope = rig.command(45.0);

    assert!(rig.dispatcher.handle(&envelope).is_accepted());
    let first = rig.wait_for_phase(ServoPhase::Idle);
    let writes = rig.probe.writes().len();

    assert!(rig.dispatcher.handle(&envelope).is_accepted());
    let second = rig.wait_for_phase(ServoPhase::Idle);
    assert!((second.current_position - first.current_position).abs() <= config().tolerance);

    // Any extra writes hold the same position.
    let last = rig.probe.last_write().unwrap();
    assert!(rig.probe.writes()[writes..].iter().all(|w| *w == last));
    rig.shutdown();
}

#[test]
fn hardware_fault_blocks_commands_until_reset() {
    let mut rig = Rig::new(&config());
    let handle = rig.runtime.handle();

    let envelope = rig.command(120.0);
    assert!(rig.dispatcher.handle(&envelope).is_accepted());
    rig.probe.fail_writes(true);
    let faulted = rig.wait_for_phase(ServoPhase::Faulted);
    assert!(faulted.current_position < 120.0);
    assert!(matches!(
        handle.snapshot().unwrap().fault,
        Some(FaultReason::Hardware(_))
    ));

    let envelope = rig.command(faulted.current_position);
    let outcome = rig.dispatcher.handle(&envelope);
    assert_eq!(outcome.reject_kind(), Some(RejectKind::HardwareFault));

    rig.probe.fail_writes(false);
    let position = handle.reset().unwrap();
    assert_eq!(rig.state(), ServoState::idle_at(position));

    let envelope = rig.command(position);
    assert!(rig.dispatcher.handle(&envelope).is_accepted());
    rig.shutdown();
}

#[test]
fn stopped_servo_task_is_hardware_fault() {
    let mut rig = Rig::new(&config());
    let envelope = rig.command(10.0);
    let Rig {
        dispatcher,
        runtime,
        probe,
        ..
    } = rig;
    runtime.shutdown().unwrap();
    assert!(probe.is_shut_down());

    let outcome = dispatcher.handle(&envelope);
    assert_eq!(outcome.reject_kind(), Some(RejectKind::HardwareFault));
}

#[test]
fn unresponsive_servo_task_is_hardware_fault_without_motion() {
    let stall = Duration::from_millis(300);
    let config = ServoConfig {
        release_after_ticks: 20,
        ..config()
    };
    let (driver, probe) = sim_driver();
    probe.stall_release(stall);
    let controller = ServoController::new(driver, &config).expect("calibrate");
    let runtime = ServoTask::spawn(controller, TICK).expect("spawn servo task");
    let dispatcher = Dispatcher::new(
        X25519ChaChaGate::new(DeviceKey::from_bytes(DEVICE_SECRET)),
        JsonCommandParser,
        AfterReleaseStalls {
            inner: MotionEnvelope::from_config(&config),
            probe: probe.clone(),
        },
        runtime.handle().with_reply_timeout(Duration::from_millis(50)),
    );
    let writes = probe.writes().len();

    let outcome = dispatcher.handle(&sealed_command(90.0));
    assert_eq!(outcome.reject_kind(), Some(RejectKind::HardwareFault));

    // Let the driver come back and the task drain its queue.
    thread::sleep(stall + Duration::from_millis(100));
    probe.stall_release(Duration::ZERO);
    let snapshot = runtime.handle().snapshot().unwrap();
    assert_eq!(snapshot.state, ServoState::idle_at(0.0));
    assert_eq!(snapshot.target, None);
    assert_eq!(probe.writes().len(), writes);
    assert_eq!(dispatcher.stats().rejected(RejectKind::HardwareFault), 1);
    runtime.shutdown().unwrap();
}
