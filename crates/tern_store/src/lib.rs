//! tern_store — device key, trust, and session storage for Tern
//!
//! Five small stores back the OMEMO engine: the local identity, one-time
//! and signed pre-keys, pinned remote identities with their trust level,
//! and opaque ratchet sessions. Everything lives in memory behind one
//! RwLock per store; attach a [`backend::StorageBackend`] and every
//! mutation is written through before the call returns, with the full
//! state loaded back once on the next open.
//!
//! # Write-through contract
//! Mutations land in memory first, then in the backend, inside the same
//! write lock. When the durable write fails the call returns
//! [`StoreError::WriteThrough`] — the in-memory state IS updated at that
//! point, and callers must treat it differently from a total failure.
//!
//! # Module layout
//! - `store`    — the cheap-to-clone handle owning all five stores
//! - `trust`    — remote identity pinning + trust levels (TOFU)
//! - `identity` — the single local identity
//! - `prekeys`  — one-time and signed pre-key stores
//! - `sessions` — opaque ratchet session cache
//! - `backend`  — write-through persistence trait
//! - `sqlite`   — sqlx/SQLite backend implementation
//! - `error`    — unified error type

pub mod backend;
pub mod error;
pub mod identity;
pub mod prekeys;
pub mod sessions;
pub mod sqlite;
pub mod store;
pub mod trust;

pub use error::StoreError;
pub use sqlite::SqliteBackend;
pub use store::Store;
pub use trust::{RemoteIdentity, TrustLevel};
