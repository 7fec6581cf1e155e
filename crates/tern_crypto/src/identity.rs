//! Long-term identity key management.
//!
//! Each device carries exactly one Ed25519 `IdentityKeyPair`, generated on
//! the device's first connect and kept for the lifetime of its device id.
//! The public half is what remote parties pin on first contact; its
//! fingerprint is what users compare out of band before marking a device
//! verified.
//!
//! Key-change policy
//! -----------------
//! This crate only mints and renders key material. What happens when a
//! pinned key stops matching (block, warn, re-verify) is decided by the
//! trust store's callers, never down here.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use rand::{rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

// ── Public key newtype ────────────────────────────────────────────────────────

/// 32-byte Ed25519 public key, base64url-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey(pub Vec<u8>);

impl IdentityKey {
    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD.decode(s)?;
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "Public key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Human-readable fingerprint: the key bytes in lower-case hex, grouped
    /// every 8 characters by a single space.
    ///
    /// Example: "05bc21e4 37a57e12 8d2f01ab 44c09e3d 91b6f2c8 0a7d5e44 2f81c6b0 d3e97a15"
    ///
    /// A pure function of the key, so both ends of a conversation render the
    /// same string and can compare it over any out-of-band channel.
    pub fn fingerprint(&self) -> String {
        let hex = hex::encode(&self.0);
        hex.chars()
            .collect::<Vec<_>>()
            .chunks(8)
            .map(|c| c.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ── Identity keypair ──────────────────────────────────────────────────────────

/// Long-term identity signing key. Drop clears memory via ZeroizeOnDrop.
#[derive(ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    pub public: IdentityKey,
    secret_bytes: [u8; 32],
}

impl IdentityKeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = IdentityKey(signing_key.verifying_key().to_bytes().to_vec());
        let secret_bytes = signing_key.to_bytes();
        Ok(Self { public, secret_bytes })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "Identity key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        let signing_key = SigningKey::from_bytes(&arr);
        let public = IdentityKey(signing_key.verifying_key().to_bytes().to_vec());
        Ok(Self { public, secret_bytes: arr })
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.secret_bytes)
    }

    /// Sign arbitrary bytes; returns the 64-byte raw Ed25519 signature.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.signing_key().sign(msg).to_bytes().to_vec()
    }

    /// Verify a signature made by any Ed25519 public key.
    pub fn verify(public_bytes: &[u8], msg: &[u8], sig_bytes: &[u8]) -> Result<(), CryptoError> {
        let vk = VerifyingKey::from_bytes(
            public_bytes.try_into().map_err(|_| CryptoError::InvalidKey("Bad pubkey len".into()))?,
        )
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let sig = Signature::from_bytes(
            sig_bytes.try_into().map_err(|_| CryptoError::InvalidKey("Bad sig len".into()))?,
        );
        vk.verify(msg, &sig).map_err(|_| CryptoError::SignatureVerification)
    }

    /// Export the public key in base64 format for bundle publication.
    pub fn public_b64(&self) -> String {
        self.public.to_b64()
    }
}

// ── Local device identity ─────────────────────────────────────────────────────

/// The identity of this logged-in device: a wire-visible device id plus the
/// long-term key pair. Built once, handed around as `Arc<LocalIdentity>`,
/// never mutated.
pub struct LocalIdentity {
    pub device_id: u32,
    pub key_pair: IdentityKeyPair,
}

impl LocalIdentity {
    /// Mint a fresh identity on a device's first connect. Device ids are
    /// random in the positive 31-bit range so every federated peer can carry
    /// them regardless of its integer width.
    pub fn generate() -> Result<Self, CryptoError> {
        let device_id = OsRng.gen_range(1..=i32::MAX as u32);
        Ok(Self {
            device_id,
            key_pair: IdentityKeyPair::generate()?,
        })
    }

    /// Rebuild a stored identity from its device id and secret key bytes.
    pub fn from_parts(device_id: u32, secret: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            device_id,
            key_pair: IdentityKeyPair::from_bytes(secret)?,
        })
    }

    pub fn public_key(&self) -> &IdentityKey {
        &self.key_pair.public
    }

    pub fn fingerprint(&self) -> String {
        self.key_pair.public.fingerprint()
    }
}
