//! Dispatcher: one inbound message through the four pipeline stages.
//!
//! ```text
//! EncryptedEnvelope ─▶ CipherGate ─▶ CommandParser ─▶ MotionEnvelope ─▶ ServoPort::begin_move
//! ```
//!
//! The first failing stage ends the pipeline. Rejections are logged with
//! their kind and counted; they never reach the actuator and never
//! propagate as process errors. `Busy` is a retryable drop; the sender is
//! not retried from here. `HardwareFault` is logged at error level as a
//! persistent condition.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error, info, warn};

use crate::cipher::{CipherGate, X25519ChaChaGate};
use crate::command::{CommandParser, JsonCommandParser};
use crate::envelope::{MotionEnvelope, MotionValidator, SafeTarget};
use crate::error::{PipelineError, REJECT_KIND_COUNT, RejectKind};
use crate::task::{ServoHandle, ServoPort};
use crate::wire::EncryptedEnvelope;

/// Result of one [`Dispatcher::handle`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Motion started toward `target`.
    Accepted {
        /// Validated target.
        target: SafeTarget,
    },
    /// Dropped at some stage; actuator untouched.
    Rejected(PipelineError),
}

impl DispatchOutcome {
    /// Whether a motion was started.
    pub fn is_accepted(&self) -> bool {
        matches!(self, DispatchOutcome::Accepted { .. })
    }

    /// Rejection kind, if rejected.
    pub fn reject_kind(&self) -> Option<RejectKind> {
        match self {
            DispatchOutcome::Accepted { .. } => None,
            DispatchOutcome::Rejected(err) => Some(err.kind()),
        }
    }
}

/// Counter snapshot. Observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Accepted commands.
    pub accepted: u64,
    /// Rejections indexed by [`RejectKind::index`].
    pub rejected: [u64; REJECT_KIND_COUNT],
}

impl DispatchStats {
    /// Rejections of one kind.
    pub fn rejected(&self, kind: RejectKind) -> u64 {
        self.rejected[kind.index()]
    }

    /// All rejections.
    pub fn total_rejected(&self) -> u64 {
        self.rejected.iter().sum()
    }

    /// Every handled message.
    pub fn total(&self) -> u64 {
        self.accepted + self.total_rejected()
    }
}

impl std::fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "accepted={}", self.accepted)?;
        for kind in RejectKind::ALL {
            write!(f, " {}={}", kind, self.rejected(kind))?;
        }
        Ok(())
    }
}

/// Production dispatcher wiring.
pub type BridgeDispatcher =
    Dispatcher<X25519ChaChaGate, JsonCommandParser, MotionEnvelope, ServoHandle>;

/// Runs the pipeline for each inbound message.
pub struct Dispatcher<G, P, V, S> {
    gate: G,
    parser: P,
    validator: V,
    servo: S,
    accepted: AtomicU64,
    rejected: [AtomicU64; REJECT_KIND_COUNT],
}

impl<G, P, V, S> Dispatcher<G, P, V, S>
where
    G: CipherGate,
    P: CommandParser,
    V: MotionValidator,
    S: ServoPort,
{
    /// Wire the four stages together.
    pub fn new(gate: G, parser: P, validator: V, servo: S) -> Self {
        Self {
            gate,
            parser,
            validator,
            servo,
            accepted: AtomicU64::new(0),
            rejected: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Servo port.
    pub fn servo(&self) -> &S {
        &self.servo
    }

    /// Decode a wire message and handle it.
    pub fn handle_wire(&self, bytes: &[u8]) -> DispatchOutcome {
        debug!(len = bytes.len(), "Inbound wire message");
        match EncryptedEnvelope::from_wire(bytes) {
            Ok(envelope) => self.handle(&envelope),
            Err(err) => self.reject(err),
        }
    }

    /// Run one envelope through the pipeline.
    pub fn handle(&self, envelope: &EncryptedEnvelope) -> DispatchOutcome {
        debug!(
            public_key_len = envelope.public_key().len(),
            payload_len = envelope.payload().len(),
            "Dispatching envelope"
        );
        match self.run(envelope) {
            Ok(target) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                info!(target = target.position(), "Command accepted");
                DispatchOutcome::Accepted { target }
            }
            Err(err) => self.reject(err),
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: std::array::from_fn(|i| self.rejected[i].load(Ordering::Relaxed)),
        }
    }

    fn run(&self, envelope: &EncryptedEnvelope) -> Result<SafeTarget, PipelineError> {
        let command = {
            let plain = self
                .gate
                .decrypt(envelope.payload(), envelope.public_key())?;
            self.parser.parse(&plain)?
        };
        let state = self.servo.state()?;
        let target = self.validator.clamp(&command, &state)?;
        self.servo.begin_move(target)?;
        Ok(target)
    }

    fn reject(&self, err: PipelineError) -> DispatchOutcome {
        let kind = err.kind();
        self.rejected[kind.index()].fetch_add(1, Ordering::Relaxed);
        if err.is_fault() {
            error!(kind = %kind, error = %err, "Command rejected: servo faulted");
        } else {
            warn!(
                kind = %kind,
                retryable = err.is_retryable(),
                error = %err,
                "Command rejected"
            );
        }
        DispatchOutcome::Rejected(err)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
