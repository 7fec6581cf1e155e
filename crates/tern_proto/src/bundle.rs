//! Published pre-key bundle DTOs.
//!
//! Only public halves ever leave the device. The bundle is what a device
//! publishes on connect so that offline peers can bootstrap a session
//! against it later; private halves stay in the local stores, indexed by
//! the same ids.

use serde::{Deserialize, Serialize};

/// Complete bundle published on connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreKeyBundle {
    /// Publishing device id.
    pub device_id: u32,
    /// Ed25519 identity public key (base64).
    pub ik_pub: String,
    pub signed_prekey: SignedPreKeyPublic,
    pub prekeys: Vec<OneTimePreKeyPublic>,
}

/// Signed pre-key public half plus its identity signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedPreKeyPublic {
    pub id: u32,
    /// X25519 public key (base64).
    pub spk_pub: String,
    /// Ed25519 signature over the raw public key bytes (base64).
    pub spk_sig: String,
}

/// One-time pre-key public half.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimePreKeyPublic {
    pub id: u32,
    /// X25519 public key (base64).
    pub opk_pub: String,
}
