//! Wire envelope carried on the command topic.
//!
//! ```json
//! {"publicKey": "<64 hex chars>", "payload": "<hex nonce || ciphertext || tag>"}
//! ```
//!
//! | Decode failure                          | Kind                |
//! |-----------------------------------------|---------------------|
//! | not a JSON object with exactly these two string fields | `MalformedCommand` |
//! | `publicKey` not hex                     | `Authentication`    |
//! | `payload` not hex                       | `Decryption`        |

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WireEnvelope {
    public_key: String,
    payload: String,
}

/// One inbound encrypted command: the sender's public key and the sealed
/// payload. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    public_key: Vec<u8>,
    payload: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Build from raw bytes.
    pub fn new(public_key: Vec<u8>, payload: Vec<u8>) -> Self {
        Self {
            public_key,
            payload,
        }
    }

    /// Sender public key bytes.
    #[inline]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// `nonce || ciphertext || tag`.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decode a wire message.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, PipelineError> {
        if !is_json_object(bytes) {
            return Err(PipelineError::MalformedCommand(
                "wire envelope: top-level value is not a JSON object".to_string(),
            ));
        }
        let wire: WireEnvelope = serde_json::from_slice(bytes).map_err(|e| {
            PipelineError::MalformedCommand(format!(
                "wire envelope: {} at line {} column {}",
                describe(e.classify()),
                e.line(),
                e.column()
            ))
        })?;

        let public_key = hex::decode(&wire.public_key)
            .map_err(|_| PipelineError::Authentication("public key is not valid hex"))?;
        let payload = hex::decode(&wire.payload)
            .map_err(|_| PipelineError::Decryption("payload is not valid hex"))?;

        Ok(Self::new(public_key, payload))
    }

    /// Encode as a wire message (lowercase hex).
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&WireEnvelope {
            public_key: hex::encode(&self.public_key),
            payload: hex::encode(&self.payload),
        })
    }
}

/// Serde maps a JSON array onto a struct positionally; only objects are
/// accepted here.
pub(crate) fn is_json_object(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}

/// Fixed description of a JSON failure. Never echoes input.
pub(crate) fn describe(category: serde_json::error::Category) -> &'static str {
    use serde_json::error::Category;
    match category {
        Category::Syntax => "not well-formed JSON",
        Category::Eof => "truncated JSON",
        Category::Data => "unexpected shape",
        Category::Io => "read failure",
    }
}
