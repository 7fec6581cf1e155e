//! tern_crypto — key material for the Tern OMEMO subsystem
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Ratchet and key-agreement internals stay behind the cipher-engine
//!   boundary in `tern_omemo`; this crate only mints, renders, and
//!   round-trips the key material that the stores hold.
//!
//! # Module layout
//! - `identity` — long-term Ed25519 identity key + the local device identity
//! - `prekeys`  — X25519 one-time and signed pre-key records
//! - `error`    — unified error type

pub mod error;
pub mod identity;
pub mod prekeys;

pub use error::CryptoError;
pub use identity::{IdentityKey, IdentityKeyPair, LocalIdentity};
pub use prekeys::{PreKeyRecord, SignedPreKeyRecord};
