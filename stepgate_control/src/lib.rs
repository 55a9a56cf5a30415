//! # StepGate Control
//!
//! The secure command-to-actuation pipeline.
//!
//! ```text
//!  wire bytes ─▶ EncryptedEnvelope ─▶ CipherGate ─▶ CommandParser ─▶ MotionEnvelope
//!                                                                       │
//!                             ServoHandle ─(mpsc)─▶ servo task ◀────────┘ begin_move
//!                                                    │
//!                                            ServoController ─▶ ServoDriver
//! ```
//!
//! ## Modules
//!
//! - [`wire`] - Wire envelope decoding
//! - [`cipher`] - Authenticated decryption (X25519 + BLAKE3 + ChaCha20-Poly1305)
//! - [`command`] - Strict `{"position": <number>}` parser
//! - [`envelope`] - Range and slew validation, [`SafeTarget`]
//! - [`controller`] - Servo state machine
//! - [`task`] - Thread owning the controller, [`ServoHandle`]
//! - [`dispatch`] - Per-message orchestration and counters
//! - [`error`] - [`PipelineError`] taxonomy

#![deny(missing_docs)]

pub mod cipher;
pub mod command;
pub mod controller;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod state;
pub mod task;
pub mod wire;

pub use cipher::{CipherGate, DeviceKey, PlainCommand, X25519ChaChaGate, seal};
pub use command::{CommandParser, JsonCommandParser, PositionCommand};
pub use controller::{ServoController, StepOutcome};
pub use dispatch::{BridgeDispatcher, DispatchOutcome, DispatchStats, Dispatcher};
pub use envelope::{MotionEnvelope, MotionLimits, MotionValidator, SafeTarget};
pub use error::{ControlError, PipelineError, RejectKind};
pub use state::{FaultReason, ServoPhase, ServoState};
pub use task::{ServoHandle, ServoPort, ServoRuntime, ServoSnapshot, ServoTask, TickStats};
pub use wire::EncryptedEnvelope;
