//! Integration tests for loading the shipped reference configuration.

use std::io::Write;
use std::path::{Path, PathBuf};

use stepgate_common::prelude::*;
use tempfile::NamedTempFile;

fn reference_config_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/stepgate.toml")
}

#[test]
fn reference_config_loads_and_validates() {
    let config = StepGateConfig::load(&reference_config_path()).expect("load reference config");
    config.validate().expect("reference config must be valid");

    assert_eq!(config.shared.service_name, "stepgate-sg90");
    assert_eq!(config.pwm.driver, "sysfs_pwm");
    assert_eq!(config.servo.travel, TravelRange { min: 0.0, max: 180.0 });
    assert_eq!(config.mqtt.topic, "engine_control");
    assert!(config.cipher.device_key_file.is_some());
}

#[test]
fn reference_config_tick_matches_pwm_period() {
    let config = StepGateConfig::load(&reference_config_path()).unwrap();
    assert_eq!(config.servo.tick_us, config.pwm.period_us);
}

#[test]
fn missing_cipher_section_is_a_parse_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[shared]
service_name = "no-key"
"#
    )
    .unwrap();
    file.flush().unwrap();

    let result = StepGateConfig::load(file.path());
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn invalid_servo_section_fails_validation() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[shared]
service_name = "bad-servo"

[servo]
min_angle = 90.0
max_angle = 10.0

[cipher]
device_key_hex = "0202020202020202020202020202020202020202020202020202020202020202"
"#
    )
    .unwrap();
    file.flush().unwrap();

    let config = StepGateConfig::load(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}
