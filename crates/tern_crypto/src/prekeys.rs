//! One-time and signed pre-key records.
//!
//! Pre-keys let a peer start a session while this device is offline: the
//! public halves are published in a bundle, the private halves stay local,
//! indexed by id, waiting to be consumed.
//!
//! - One-time pre-key (X25519): consumed exactly once. The record MUST be
//!   deleted as soon as a remote party has used it; keeping it around
//!   breaks forward secrecy.
//! - Signed pre-key (X25519): public half signed by the device's Ed25519
//!   identity key, rotated by storing a replacement under a fresh id so
//!   in-flight handshakes against the old one can still complete.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::{error::CryptoError, identity::IdentityKeyPair};

fn to_32(bytes: &[u8]) -> Result<[u8; 32], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("expected 32-byte key".into()))
}

// ── One-time pre-key ──────────────────────────────────────────────────────────

/// X25519 keypair published for one-shot session bootstrap.
#[derive(ZeroizeOnDrop)]
pub struct PreKeyRecord {
    #[zeroize(skip)]
    pub id: u32,
    #[zeroize(skip)]
    public: [u8; 32],
    secret: [u8; 32],
}

impl PreKeyRecord {
    pub fn generate(id: u32) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self {
            id,
            public: public.to_bytes(),
            secret: secret.to_bytes(),
        }
    }

    /// Rebuild a stored record from raw key bytes.
    pub fn from_parts(id: u32, public: &[u8], secret: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            id,
            public: to_32(public)?,
            secret: to_32(secret)?,
        })
    }

    pub fn public_bytes(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }
}

/// Generate a batch of one-time pre-keys with sequential ids starting at
/// `start_id`. Ids clamp at `u32::MAX` rather than wrapping back onto
/// already-issued values.
pub fn generate_prekeys(start_id: u32, count: u32) -> Vec<PreKeyRecord> {
    (0..count)
        .map(|i| PreKeyRecord::generate(start_id.saturating_add(i)))
        .collect()
}

// ── Signed pre-key ────────────────────────────────────────────────────────────

/// X25519 keypair whose public half carries an identity-key signature, so
/// bundle consumers can tell the pre-key really belongs to this device.
#[derive(ZeroizeOnDrop)]
pub struct SignedPreKeyRecord {
    #[zeroize(skip)]
    pub id: u32,
    #[zeroize(skip)]
    public: [u8; 32],
    secret: [u8; 32],
    /// Ed25519 signature over the raw public half.
    #[zeroize(skip)]
    pub signature: Vec<u8>,
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
}

impl SignedPreKeyRecord {
    /// Generate a signed pre-key: an X25519 keypair with the public half
    /// signed by the device's Ed25519 identity key.
    pub fn generate(identity: &IdentityKeyPair, id: u32) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        let signature = identity.sign(public.as_bytes());
        Self {
            id,
            public: public.to_bytes(),
            secret: secret.to_bytes(),
            signature,
            created_at: Utc::now(),
        }
    }

    /// Rebuild a stored record from raw bytes.
    pub fn from_parts(
        id: u32,
        public: &[u8],
        secret: &[u8],
        signature: Vec<u8>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, CryptoError> {
        Ok(Self {
            id,
            public: to_32(public)?,
            secret: to_32(secret)?,
            signature,
            created_at,
        })
    }

    pub fn public_bytes(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    /// Verify the signature against an identity public key.
    pub fn verify(&self, identity_public: &[u8]) -> Result<(), CryptoError> {
        IdentityKeyPair::verify(identity_public, &self.public, &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_prekey_verifies_against_its_identity() {
        let identity = IdentityKeyPair::generate().unwrap();
        let spk = SignedPreKeyRecord::generate(&identity, 1);
        spk.verify(identity.public.as_bytes()).unwrap();
    }

    #[test]
    fn signed_prekey_rejects_wrong_identity() {
        let identity = IdentityKeyPair::generate().unwrap();
        let other = IdentityKeyPair::generate().unwrap();
        let spk = SignedPreKeyRecord::generate(&identity, 1);
        assert!(spk.verify(other.public.as_bytes()).is_err());
    }

    #[test]
    fn batch_generation_uses_sequential_ids() {
        let batch = generate_prekeys(10, 5);
        let ids: Vec<u32> = batch.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn batch_generation_saturates_at_the_id_ceiling() {
        let batch = generate_prekeys(u32::MAX - 1, 3);
        let ids: Vec<u32> = batch.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![u32::MAX - 1, u32::MAX, u32::MAX]);
    }

    #[test]
    fn prekey_roundtrips_through_raw_parts() {
        let record = PreKeyRecord::generate(7);
        let rebuilt =
            PreKeyRecord::from_parts(7, record.public_bytes(), record.secret_bytes()).unwrap();
        assert_eq!(rebuilt.public_bytes(), record.public_bytes());
        assert_eq!(rebuilt.secret_bytes(), record.secret_bytes());
    }
}
