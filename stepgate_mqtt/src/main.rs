//! # StepGate MQTT Bridge
//!
//! Receives encrypted engine control envelopes from the broker, runs them
//! through the command pipeline and drives the servo.
//!
//! # Usage
//!
//! ```bash
//! # Run against real hardware with the default config
//! stepgate_mqtt --config /etc/stepgate/stepgate.toml
//!
//! # Simulation driver, verbose, sweep before connecting
//! stepgate_mqtt -c config/stepgate.toml -s -v --self-test
//!
//! # Produce a wire envelope for manual testing
//! stepgate_mqtt seal --device-public <64 hex chars> --position 90
//! ```

mod session;

use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use stepgate_common::config::{LogLevel, StepGateConfig};
use stepgate_common::consts::DEFAULT_CONFIG_PATH;
use stepgate_control::{
    DeviceKey, Dispatcher, JsonCommandParser, MotionEnvelope, PositionCommand, ServoController,
    ServoTask, X25519ChaChaGate, seal,
};
use stepgate_hal::DriverRegistry;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// StepGate MQTT Bridge - encrypted position commands to a step servo
#[derive(Parser, Debug)]
#[command(name = "stepgate_mqtt")]
#[command(version)]
#[command(about = "Decrypts engine control commands from MQTT and drives the servo")]
#[command(long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to stepgate.toml
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Force the simulation driver
    #[arg(short = 's', long)]
    simulate: bool,

    /// Override `[pwm].driver`
    #[arg(short, long)]
    driver: Option<String>,

    /// Sweep min → max → calibration before connecting
    #[arg(long)]
    self_test: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a wire envelope carrying `{"position": <deg>}` for a device
    Seal {
        /// Device X25519 public key (hex)
        #[arg(long, value_name = "HEX")]
        device_public: String,

        /// Target position in degrees
        #[arg(long, allow_negative_numbers = true)]
        position: f64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("StepGate bridge failed: {}", e);
        eprintln!("stepgate_mqtt: {e}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(Command::Seal {
        device_public,
        position,
    }) = &args.command
    {
        setup_tracing(&args, None);
        println!("{}", seal_wire(device_public, *position, &mut OsRng)?);
        return Ok(());
    }

    let loaded = StepGateConfig::load_validated(&args.config);
    setup_tracing(&args, loaded.as_ref().ok().map(|c| c.shared.log_level));
    let mut config = loaded?;

    info!(
        service = %config.shared.service_name,
        "StepGate bridge v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    if args.simulate {
        info!("Simulation mode enabled");
        config.pwm.driver = "simulation".to_string();
    } else if let Some(driver) = &args.driver {
        info!("Driver from CLI: {}", driver);
        config.pwm.driver = driver.clone();
    }

    let gate = X25519ChaChaGate::new(DeviceKey::from_config(&config.cipher)?);
    info!(device_public = %hex::encode(gate.device_public()), "Device key loaded");

    let driver = DriverRegistry::with_builtin().create_initialized(&config.pwm)?;
    let controller = ServoController::new(driver, &config.servo)?;
    let runtime = ServoTask::spawn(controller, config.servo.tick())?;

    if args.self_test {
        if let Err(e) = self_test::run(&runtime.handle(), &config.servo) {
            error!("Self-test failed: {}", e);
            if let Err(e) = runtime.shutdown() {
                warn!("Servo shutdown after failed self-test: {}", e);
            }
            return Err(e.into());
        }
    }

    let dispatcher = Dispatcher::new(
        gate,
        JsonCommandParser,
        MotionEnvelope::from_config(&config.servo),
        runtime.handle(),
    );

    let (client, connection) = session::connect(&config.mqtt);
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        let client = client.clone();
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            running.store(false, Ordering::SeqCst);
            if let Err(e) = client.disconnect() {
                warn!("Disconnect request failed: {}", e);
            }
        })?;
    }

    session::run(&config.mqtt, &dispatcher, &running, &client, connection);

    let stats = dispatcher.stats();
    drop(dispatcher);
    match runtime.shutdown() {
        Ok(timing) => info!(
            ticks = timing.ticks,
            late_ticks = timing.late_ticks,
            max_step_us = timing.max_step_us,
            abandoned = timing.abandoned,
            "Servo task stopped"
        ),
        Err(e) => error!("Servo task shutdown failed: {}", e),
    }

    info!(%stats, "StepGate bridge shutdown complete");
    Ok(())
}

/// Seal a position command for `device_public_hex` and encode it for the wire.
fn seal_wire<R: RngCore + CryptoRng>(
    device_public_hex: &str,
    position: f64,
    rng: &mut R,
) -> Result<String, Box<dyn std::error::Error>> {
    if !position.is_finite() {
        return Err("position must be a finite number".into());
    }
    let device_public: [u8; 32] = hex::decode(device_public_hex.trim())?
        .as_slice()
        .try_into()
        .map_err(|_| "device public key must be 32 bytes")?;
    let plaintext = serde_json::to_vec(&PositionCommand { position })?;
    let envelope =
        seal(&device_public, &plaintext, rng).map_err(|_| "device public key is unusable")?;
    Ok(envelope.to_wire()?)
}

fn level_for(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

/// Setup tracing subscriber based on CLI arguments and `[shared].log_level`.
fn setup_tracing(args: &Args, configured: Option<LogLevel>) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        configured.map_or(Level::INFO, level_for)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
