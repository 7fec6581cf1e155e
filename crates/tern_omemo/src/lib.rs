//! tern_omemo — multi-device end-to-end encryption orchestration for Tern
//!
//! OMEMO-style messaging: one account owns many devices, each with its own
//! identity key and ratchet session, and an outgoing message is encrypted
//! once then fanned out with a per-device wrapped content key. This crate
//! owns the bookkeeping around that: the local identity lifecycle, pre-key
//! bundle publication, recipient device resolution, and the
//! encrypt-or-fall-back send policy. The ratchet itself sits behind the
//! [`CipherEngine`] trait.

pub mod config;
pub mod discovery;
pub mod engine;
pub mod manager;

pub use config::OmemoConfig;
pub use discovery::{DeviceDiscovery, DiscoveryError, PinnedDeviceDiscovery};
pub use engine::{CipherEngine, EncryptedPayload, EngineError};
pub use manager::OmemoManager;
