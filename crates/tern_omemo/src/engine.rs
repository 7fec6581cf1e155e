//! The pluggable cipher engine boundary.
//!
//! Everything above this trait is deliberate bookkeeping: device sets,
//! trust pins, fallback policy. Everything below it is the ratchet
//! implementation, which this crate treats as a black box.

use async_trait::async_trait;
use thiserror::Error;

use tern_crypto::LocalIdentity;
use tern_proto::{DeviceAddress, WrappedKey};

/// Engine-level failure. Carries a description only; the orchestrator
/// never branches on the cause, it falls back to plaintext either way.
#[derive(Debug, Error)]
#[error("Cipher engine: {0}")]
pub struct EngineError(pub String);

/// Result of one encryption pass: the body encrypted once under a fresh
/// content key, plus that key wrapped per recipient device.
pub struct EncryptedPayload {
    /// Initialisation vector shared by every recipient.
    pub iv: Vec<u8>,
    /// One wrap of the content key per device passed to `encrypt`.
    pub keys: Vec<WrappedKey>,
    /// AEAD ciphertext of the plaintext body.
    pub ciphertext: Vec<u8>,
}

/// A ratchet implementation capable of encrypting to a set of devices in
/// one pass.
///
/// The engine owns the session and trust side effects of a send: it
/// establishes missing sessions from published bundles, pins identity keys
/// it meets on the way (first use pins at `Undecided`), and advances the
/// ratchet state of every session it touches. Callers hand it the full
/// device set in a single call so all recipients share one IV and one
/// ciphertext.
#[async_trait]
pub trait CipherEngine: Send + Sync {
    async fn encrypt(
        &self,
        devices: &[DeviceAddress],
        plaintext: &[u8],
        identity: &LocalIdentity,
    ) -> Result<EncryptedPayload, EngineError>;
}
