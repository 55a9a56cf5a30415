//! CommandParser: verified plaintext to [`PositionCommand`].
//!
//! The schema is strict. The plaintext must be UTF-8 and a single JSON
//! object with exactly one numeric field, `position`:
//!
//! | Input                               | Result             |
//! |-------------------------------------|--------------------|
//! | `{"position": 90}`                  | `position = 90.0`  |
//! | `{"position": 90, "speed": 1}`      | `MalformedCommand` |
//! | `{"position": 1, "position": 2}`    | `MalformedCommand` |
//! | `[90]`                              | `MalformedCommand` |
//! | `{"position": "90"}`                | `MalformedCommand` |
//! | `{}`                                | `MalformedCommand` |
//!
//! Rejection messages describe the failure category and location only,
//! never the plaintext.

use serde::{Deserialize, Serialize};

use crate::cipher::PlainCommand;
use crate::error::PipelineError;
use crate::wire::{describe, is_json_object};

/// Requested actuator position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PositionCommand {
    /// Target angle.
    pub position: f64,
}

/// Parses verified plaintext into a command.
pub trait CommandParser {
    /// Parse `plain`. Pure; no I/O.
    fn parse(&self, plain: &PlainCommand) -> Result<PositionCommand, PipelineError>;
}

/// Strict JSON parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCommandParser;

impl CommandParser for JsonCommandParser {
    fn parse(&self, plain: &PlainCommand) -> Result<PositionCommand, PipelineError> {
        let bytes = plain.as_bytes();
        if std::str::from_utf8(bytes).is_err() {
            return Err(malformed("plaintext is not UTF-8".to_string()));
        }
        if !is_json_object(bytes) {
            return Err(malformed("top-level value is not a JSON object".to_string()));
        }

        serde_json::from_slice(bytes).map_err(|e| {
            malformed(format!(
                "{} at line {} column {}",
                describe(e.classify()),
                e.line(),
                e.column()
            ))
        })
    }
}

fn malformed(message: String) -> PipelineError {
    PipelineError::MalformedCommand(message)
}
