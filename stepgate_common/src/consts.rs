//! System-wide constants for the StepGate workspace.
//!
//! Single source of truth for default limits, timings and paths.

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/stepgate/stepgate.toml";

/// Default servo tick in microseconds (50 Hz, one tick per PWM frame).
pub const DEFAULT_TICK_US: u32 = 20_000;

/// Default lower bound of the safe angle range (degrees).
pub const DEFAULT_MIN_ANGLE: f64 = 0.0;

/// Default upper bound of the safe angle range (degrees).
pub const DEFAULT_MAX_ANGLE: f64 = 180.0;

/// Default maximum change a single command may request (degrees).
pub const DEFAULT_MAX_SLEW_PER_COMMAND: f64 = 180.0;

/// Default per-tick rate limit (degrees). 1.2° per 20 ms tick = 60°/s.
pub const DEFAULT_MAX_RATE_PER_TICK: f64 = 1.2;

/// Default arrival tolerance (degrees).
pub const DEFAULT_TOLERANCE: f64 = 0.5;

/// Idle ticks before the driver stops emitting holding pulses (0.5 s at 50 Hz).
pub const DEFAULT_RELEASE_AFTER_TICKS: u32 = 25;

/// Default PWM period in microseconds (SG90: 50 Hz).
pub const DEFAULT_PWM_PERIOD_US: u32 = 20_000;

/// Default pulse width at normalized position 0.0 (SG90).
pub const DEFAULT_MIN_PULSE_US: u32 = 500;

/// Default pulse width at normalized position 1.0 (SG90).
pub const DEFAULT_MAX_PULSE_US: u32 = 2_500;

/// Default sysfs PWM class directory.
pub const DEFAULT_SYSFS_PWM_ROOT: &str = "/sys/class/pwm";

/// Default servo driver name.
pub const DEFAULT_DRIVER: &str = "simulation";

/// Default MQTT topic carrying engine control envelopes.
pub const DEFAULT_TOPIC: &str = "engine_control";

/// Default MQTT client identifier.
pub const DEFAULT_CLIENT_ID: &str = "engine_control_sg90";

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default MQTT keep-alive in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

/// Environment variable overriding the broker host.
pub const ENV_BROKER_HOST: &str = "IP_ADDRESS";

/// Environment variable overriding the broker port.
pub const ENV_BROKER_PORT: &str = "PORT";
