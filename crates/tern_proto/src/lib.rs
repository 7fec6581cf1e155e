//! tern_proto — wire-facing types for the Tern OMEMO subsystem
//!
//! Everything in here crosses a process boundary: envelopes ride inside
//! message stanzas, bundles are published for session bootstrap, addresses
//! name remote cryptographic endpoints. Binary fields are base64url-encoded
//! in the serialised form so the types embed cleanly in JSON payloads.
//!
//! # Module layout
//! - `address`  — `DeviceAddress`, the (bare JID, device id) endpoint key
//! - `envelope` — multi-recipient encrypted envelope + outbound message
//! - `bundle`   — published pre-key bundle DTOs (public halves only)

pub mod address;
pub mod bundle;
pub mod envelope;

pub use address::DeviceAddress;
pub use bundle::{OneTimePreKeyPublic, PreKeyBundle, SignedPreKeyPublic};
pub use envelope::{Envelope, MessageBody, OutboundMessage, WrappedKey, ENVELOPE_VERSION};
