//! Write-through persistence boundary.

use std::sync::Arc;

use async_trait::async_trait;

use tern_crypto::{LocalIdentity, PreKeyRecord, SignedPreKeyRecord};
use tern_proto::DeviceAddress;

use crate::{error::StoreError, trust::RemoteIdentity};

pub type SharedBackend = Arc<dyn StorageBackend>;

/// Durable storage behind the in-memory stores.
///
/// The `load_*` methods run once when a [`crate::Store`] opens; afterwards
/// every mutation is written through inside the owning store's write lock.
/// Implementations must upsert on conflict and tolerate deletes of absent
/// rows — idempotent removal is part of the store contract, and a delete
/// retried after a [`StoreError::WriteThrough`] failure hits a row that
/// memory no longer knows about.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn load_local_identity(&self) -> Result<Option<LocalIdentity>, StoreError>;
    async fn save_local_identity(&self, identity: &LocalIdentity) -> Result<(), StoreError>;

    async fn load_remote_identities(&self) -> Result<Vec<RemoteIdentity>, StoreError>;
    async fn upsert_remote_identity(&self, identity: &RemoteIdentity) -> Result<(), StoreError>;
    async fn delete_remote_identity(&self, addr: &DeviceAddress) -> Result<(), StoreError>;

    async fn load_prekeys(&self) -> Result<Vec<PreKeyRecord>, StoreError>;
    /// Highest pre-key id ever stored, whether or not its row still exists.
    /// Keeps id allocation monotonic across reopens after consumed pre-keys
    /// have been deleted.
    async fn load_prekey_watermark(&self) -> Result<u32, StoreError>;
    async fn upsert_prekey(&self, record: &PreKeyRecord) -> Result<(), StoreError>;
    async fn delete_prekey(&self, id: u32) -> Result<(), StoreError>;

    async fn load_signed_prekeys(&self) -> Result<Vec<SignedPreKeyRecord>, StoreError>;
    async fn upsert_signed_prekey(&self, record: &SignedPreKeyRecord) -> Result<(), StoreError>;

    async fn load_sessions(&self) -> Result<Vec<(DeviceAddress, Vec<u8>)>, StoreError>;
    async fn upsert_session(&self, addr: &DeviceAddress, state: &[u8]) -> Result<(), StoreError>;
    async fn delete_session(&self, addr: &DeviceAddress) -> Result<(), StoreError>;
}
