//! CipherGate: authenticated decryption of inbound commands.
//!
//! # Key model
//!
//! Each device holds a pre-shared static X25519 secret. A sender generates
//! an ephemeral X25519 pair per message and ships the ephemeral public key
//! alongside the payload.
//!
//! 1. `shared = X25519(device_secret, ephemeral_public)`; a
//!    non-contributory result is rejected
//! 2. `key = BLAKE3::derive_key(KDF_CONTEXT, shared || ephemeral_public || device_public)`
//! 3. `payload = nonce(12) || ChaCha20-Poly1305(key, nonce, plaintext, aad = ephemeral_public)`
//!
//! | Failure                                         | Kind             |
//! |-------------------------------------------------|------------------|
//! | key not 32 bytes, all-zero, or low-order         | `Authentication` |
//! | payload shorter than nonce + tag                 | `Decryption`     |
//! | tag mismatch                                     | `Authentication` |
//!
//! Nothing in this module logs plaintext or key material. Intermediate key
//! buffers are zeroized on drop.

use std::path::Path;

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::{CryptoRng, RngCore};
use stepgate_common::config::{CipherConfig, ConfigError};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::PipelineError;
use crate::wire::EncryptedEnvelope;

/// X25519 key length.
pub const KEY_LEN: usize = 32;

/// ChaCha20-Poly1305 nonce length.
pub const NONCE_LEN: usize = 12;

/// Poly1305 tag length.
pub const TAG_LEN: usize = 16;

/// BLAKE3 key-derivation context.
pub const KDF_CONTEXT: &str = "stepgate 2026 engine_control command v1";

/// Verified plaintext of one command.
///
/// The buffer is wiped on drop and `Debug` never shows the content.
pub struct PlainCommand(Zeroizing<Vec<u8>>);

impl PlainCommand {
    /// Wrap already-authenticated bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Plaintext bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Plaintext length.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the plaintext is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for PlainCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PlainCommand(<redacted {} bytes>)", self.0.len())
    }
}

/// Decrypts and authenticates an inbound payload.
///
/// Implementations are stateless per call and deterministic: the same
/// inputs always produce the same plaintext or the same failure kind.
pub trait CipherGate {
    /// Verify and decrypt `payload` sent under `public_key`.
    fn decrypt(&self, payload: &[u8], public_key: &[u8]) -> Result<PlainCommand, PipelineError>;
}

/// The device's static X25519 key pair.
pub struct DeviceKey {
    secret: StaticSecret,
    public: PublicKey,
}

impl DeviceKey {
    /// Build from raw secret bytes.
    pub fn from_bytes(secret: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(secret);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Parse a hex-encoded 32-byte secret. Surrounding whitespace is ignored.
    pub fn from_hex(text: &str) -> Result<Self, ConfigError> {
        let bytes = Zeroizing::new(
            hex::decode(text.trim())
                .map_err(|_| invalid_key("device key is not valid hex"))?,
        );
        let mut secret = Zeroizing::new([0u8; KEY_LEN]);
        if bytes.len() != KEY_LEN {
            return Err(invalid_key("device key must be 32 bytes"));
        }
        secret.copy_from_slice(&bytes);
        if secret.iter().all(|&b| b == 0) {
            return Err(invalid_key("device key is all zeros"));
        }
        Ok(Self::from_bytes(*secret))
    }

    /// Read a hex key file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(format!("device key {}: {}", path.display(), e))
            }
        })?);
        Self::from_hex(&text)
    }

    /// Resolve the key from the `[cipher]` section.
    pub fn from_config(config: &CipherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        match (&config.device_key_file, &config.device_key_hex) {
            (Some(path), _) => Self::load(path),
            (None, Some(text)) => Self::from_hex(text),
            (None, None) => Err(invalid_key("no device key configured")),
        }
    }

    /// Public half, distributed to senders.
    pub fn public_key(&self) -> [u8; KEY_LEN] {
        self.public.to_bytes()
    }
}

impl std::fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKey")
            .field("public", &hex::encode(self.public.as_bytes()))
            .finish_non_exhaustive()
    }
}

fn invalid_key(message: &str) -> ConfigError {
    ConfigError::ValidationError(format!("cipher: {message}"))
}

/// X25519 + BLAKE3 + ChaCha20-Poly1305 gate.
#[derive(Debug)]
pub struct X25519ChaChaGate {
    device: DeviceKey,
}

impl X25519ChaChaGate {
    /// Gate for `device`.
    pub fn new(device: DeviceKey) -> Self {
        Self { device }
    }

    /// Device public key.
    pub fn device_public(&self) -> [u8; KEY_LEN] {
        self.device.public_key()
    }
}

impl CipherGate for X25519ChaChaGate {
    fn decrypt(&self, payload: &[u8], public_key: &[u8]) -> Result<PlainCommand, PipelineError> {
        let peer: [u8; KEY_LEN] = public_key
            .try_into()
            .map_err(|_| PipelineError::Authentication("public key must be 32 bytes"))?;
        if peer == [0u8; KEY_LEN] {
            return Err(PipelineError::Authentication("public key is all zeros"));
        }
        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(PipelineError::Decryption("payload shorter than nonce and tag"));
        }

        let shared = self.device.secret.diffie_hellman(&PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(PipelineError::Authentication("public key is a low-order point"));
        }

        let key = session_key(shared.as_bytes(), &peer, self.device.public.as_bytes());
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_slice()));
        let (nonce, sealed) = payload.split_at(NONCE_LEN);

        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: &peer,
                },
            )
            .map(PlainCommand::new)
            .map_err(|_| PipelineError::Authentication("authentication tag mismatch"))
    }
}

fn session_key(
    shared: &[u8; KEY_LEN],
    ephemeral_public: &[u8; KEY_LEN],
    device_public: &[u8; KEY_LEN],
) -> Zeroizing<[u8; KEY_LEN]> {
    let mut material = Zeroizing::new([0u8; 3 * KEY_LEN]);
    material[..KEY_LEN].copy_from_slice(shared);
    material[KEY_LEN..2 * KEY_LEN].copy_from_slice(ephemeral_public);
    material[2 * KEY_LEN..].copy_from_slice(device_public);
    Zeroizing::new(blake3::derive_key(KDF_CONTEXT, material.as_slice()))
}

/// Sender side: seal `plaintext` for the device owning `device_public`.
///
/// Used by the bridge's `seal` helper and by tests; the inbound pipeline
/// never calls it.
pub fn seal<R: RngCore + CryptoRng>(
    device_public: &[u8; KEY_LEN],
    plaintext: &[u8],
    rng: &mut R,
) -> Result<EncryptedEnvelope, chacha20poly1305::aead::Error> {
    let ephemeral = StaticSecret::random_from_rng(&mut *rng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&PublicKey::from(*device_public));
    if !shared.was_contributory() {
        return Err(chacha20poly1305::aead::Error);
    }

    let key = session_key(shared.as_bytes(), ephemeral_public.as_bytes(), device_public);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_slice()));

    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);
    let sealed = cipher.encrypt(
        Nonce::from_slice(&nonce),
        Payload {
            msg: plaintext,
            aad: ephemeral_public.as_bytes(),
        },
    )?;

    let mut payload = Vec::with_capacity(NONCE_LEN + sealed.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&sealed);
    Ok(EncryptedEnvelope::new(
        ephemeral_public.to_bytes().to_vec(),
        payload,
    ))
}

// ─── Tests ──────────────────────────────────────────────────────────
