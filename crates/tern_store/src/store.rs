//! The store handle: one cheap-to-clone owner for all five sub-stores.

use std::sync::Arc;

use tracing::debug;

use tern_proto::DeviceAddress;

use crate::backend::{SharedBackend, StorageBackend};
use crate::error::StoreError;
use crate::identity::IdentityStore;
use crate::prekeys::{PreKeyStore, SignedPreKeyStore};
use crate::sessions::SessionStore;
use crate::trust::TrustStore;

/// Handle over the full key/trust/session state of one device.
///
/// Clones share the underlying stores, so the engine, the orchestrator and
/// the UI layer can each hold their own `Store` without coordination.
#[derive(Clone)]
pub struct Store {
    identity: Arc<IdentityStore>,
    prekeys: Arc<PreKeyStore>,
    signed_prekeys: Arc<SignedPreKeyStore>,
    trust: Arc<TrustStore>,
    sessions: Arc<SessionStore>,
}

impl Store {
    /// Purely in-memory store. State is gone when the last clone drops;
    /// used by tests and by ephemeral "incognito" accounts.
    pub fn in_memory() -> Self {
        Self::with_backend(None)
    }

    fn with_backend(backend: Option<SharedBackend>) -> Self {
        Self {
            identity: Arc::new(IdentityStore::new(backend.clone())),
            prekeys: Arc::new(PreKeyStore::new(backend.clone())),
            signed_prekeys: Arc::new(SignedPreKeyStore::new(backend.clone())),
            trust: Arc::new(TrustStore::new(backend.clone())),
            sessions: Arc::new(SessionStore::new(backend)),
        }
    }

    /// Open a store on top of a durable backend: load everything the
    /// backend has, then write every later mutation through to it.
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Result<Self, StoreError> {
        let store = Self::with_backend(Some(backend.clone()));

        let identity = backend.load_local_identity().await?;
        let remotes = backend.load_remote_identities().await?;
        let prekeys = backend.load_prekeys().await?;
        let prekey_watermark = backend.load_prekey_watermark().await?;
        let signed = backend.load_signed_prekeys().await?;
        let sessions = backend.load_sessions().await?;

        debug!(
            has_identity = identity.is_some(),
            remote_identities = remotes.len(),
            prekeys = prekeys.len(),
            prekey_watermark,
            signed_prekeys = signed.len(),
            sessions = sessions.len(),
            "loaded persisted device state"
        );

        store.identity.load(identity).await;
        store.trust.load(remotes).await;
        store.prekeys.load(prekeys, prekey_watermark).await;
        store.signed_prekeys.load(signed).await;
        store.sessions.load(sessions).await;

        Ok(store)
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    pub fn prekeys(&self) -> &PreKeyStore {
        &self.prekeys
    }

    pub fn signed_prekeys(&self) -> &SignedPreKeyStore {
        &self.signed_prekeys
    }

    pub fn trust(&self) -> &TrustStore {
        &self.trust
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Forget a remote device entirely: its pinned identity key, its trust
    /// record and its ratchet session. The next message from that device
    /// starts over at first-use pinning. Idempotent.
    pub async fn delete_device(&self, addr: &DeviceAddress) -> Result<(), StoreError> {
        self.trust.remove(addr).await?;
        self.sessions.remove(addr).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteBackend;
    use crate::trust::TrustLevel;

    use async_trait::async_trait;
    use tern_crypto::{IdentityKey, LocalIdentity, PreKeyRecord, SignedPreKeyRecord};

    fn addr(device_id: u32) -> DeviceAddress {
        DeviceAddress::new("bob@example.com", device_id)
    }

    #[tokio::test]
    async fn delete_device_clears_trust_and_session_and_is_idempotent() {
        let store = Store::in_memory();
        let addr = addr(3);

        store
            .trust()
            .save_remote_identity(&addr, &IdentityKey(vec![0x03; 32]))
            .await
            .unwrap();
        store.sessions().save(&addr, b"state").await.unwrap();

        store.delete_device(&addr).await.unwrap();
        assert!(store.trust().identities_for_jid("bob@example.com").await.is_empty());
        assert!(!store.sessions().contains(&addr).await);

        // A second delete finds nothing and still succeeds.
        store.delete_device(&addr).await.unwrap();
    }

    #[tokio::test]
    async fn state_survives_across_store_opens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(SqliteBackend::open(&dir.path().join("keys.db")).await.unwrap());

        let fingerprint = {
            let store = Store::open(backend.clone()).await.unwrap();
            let identity = store
                .identity()
                .save(LocalIdentity::generate().unwrap())
                .await
                .unwrap();
            store
                .prekeys()
                .save(PreKeyRecord::generate(1))
                .await
                .unwrap();
            store
                .signed_prekeys()
                .save(SignedPreKeyRecord::generate(&identity.key_pair, 1))
                .await
                .unwrap();
            store
                .trust()
                .save_remote_identity(&addr(2), &IdentityKey(vec![0x0B; 32]))
                .await
                .unwrap();
            store
                .trust()
                .set_trust_level(&addr(2), TrustLevel::Verified)
                .await
                .unwrap();
            store.sessions().save(&addr(2), b"ratchet").await.unwrap();
            identity.fingerprint()
        };

        let reopened = Store::open(backend).await.unwrap();
        assert_eq!(reopened.identity().fingerprint().await.unwrap(), fingerprint);
        assert_eq!(reopened.prekeys().count().await, 1);
        assert!(reopened.signed_prekeys().latest().await.is_some());
        assert_eq!(reopened.trust().trust_level(&addr(2)).await, TrustLevel::Verified);
        assert_eq!(reopened.sessions().get(&addr(2)).await.unwrap(), b"ratchet");
    }

    #[tokio::test]
    async fn deletions_survive_across_store_opens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(SqliteBackend::open(&dir.path().join("keys.db")).await.unwrap());

        {
            let store = Store::open(backend.clone()).await.unwrap();
            store
                .trust()
                .save_remote_identity(&addr(2), &IdentityKey(vec![0x0B; 32]))
                .await
                .unwrap();
            store.sessions().save(&addr(2), b"ratchet").await.unwrap();
            store.prekeys().save(PreKeyRecord::generate(5)).await.unwrap();

            store.delete_device(&addr(2)).await.unwrap();
            store.prekeys().remove(5).await.unwrap();
        }

        let reopened = Store::open(backend).await.unwrap();
        assert!(reopened.trust().identities_for_jid("bob@example.com").await.is_empty());
        assert!(!reopened.sessions().contains(&addr(2)).await);
        assert_eq!(reopened.prekeys().count().await, 0);
    }

    #[tokio::test]
    async fn consumed_prekey_ids_are_not_reissued_after_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(SqliteBackend::open(&dir.path().join("keys.db")).await.unwrap());

        {
            let store = Store::open(backend.clone()).await.unwrap();
            for id in 1..=3 {
                store.prekeys().save(PreKeyRecord::generate(id)).await.unwrap();
            }
            // A peer consumed the newest pre-key; its row is durably gone.
            store.prekeys().remove(3).await.unwrap();
        }

        let reopened = Store::open(backend).await.unwrap();
        assert_eq!(reopened.prekeys().count().await, 2);
        // Replenishment must continue above the consumed id: a peer still
        // holding the old bundle entry for id 3 expects the original key.
        assert_eq!(reopened.prekeys().next_id(1).await, 4);
    }

    // ── Write-through failure semantics ───────────────────────────────────────

    /// Backend whose loads succeed (empty) and whose writes always fail,
    /// standing in for a disk that filled up mid-run.
    struct FailingBackend;

    #[async_trait]
    impl crate::backend::StorageBackend for FailingBackend {
        async fn load_local_identity(&self) -> Result<Option<LocalIdentity>, StoreError> {
            Ok(None)
        }
        async fn save_local_identity(&self, _: &LocalIdentity) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
        async fn load_remote_identities(&self) -> Result<Vec<crate::trust::RemoteIdentity>, StoreError> {
            Ok(Vec::new())
        }
        async fn upsert_remote_identity(
            &self,
            _: &crate::trust::RemoteIdentity,
        ) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
        async fn delete_remote_identity(&self, _: &DeviceAddress) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
        async fn load_prekeys(&self) -> Result<Vec<PreKeyRecord>, StoreError> {
            Ok(Vec::new())
        }
        async fn load_prekey_watermark(&self) -> Result<u32, StoreError> {
            Ok(0)
        }
        async fn upsert_prekey(&self, _: &PreKeyRecord) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
        async fn delete_prekey(&self, _: u32) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
        async fn load_signed_prekeys(&self) -> Result<Vec<SignedPreKeyRecord>, StoreError> {
            Ok(Vec::new())
        }
        async fn upsert_signed_prekey(&self, _: &SignedPreKeyRecord) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
        async fn load_sessions(&self) -> Result<Vec<(DeviceAddress, Vec<u8>)>, StoreError> {
            Ok(Vec::new())
        }
        async fn upsert_session(&self, _: &DeviceAddress, _: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
        async fn delete_session(&self, _: &DeviceAddress) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }
    }

    #[tokio::test]
    async fn failed_durable_write_reports_write_through_but_keeps_memory() {
        let store = Store::open(Arc::new(FailingBackend)).await.unwrap();
        let addr = addr(1);

        let err = store
            .trust()
            .save_remote_identity(&addr, &IdentityKey(vec![0x01; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteThrough { .. }));

        // The in-memory pin is live despite the failed durable write.
        assert_eq!(store.trust().identities_for_jid("bob@example.com").await.len(), 1);
        assert!(!store.trust().is_trusted(&addr, &IdentityKey(vec![0x02; 32])).await);

        let err = store.sessions().save(&addr, b"state").await.unwrap_err();
        assert!(matches!(err, StoreError::WriteThrough { .. }));
        assert!(store.sessions().contains(&addr).await);
    }

    #[tokio::test]
    async fn delete_of_absent_record_surfaces_plain_database_error() {
        let store = Store::open(Arc::new(FailingBackend)).await.unwrap();

        // Nothing in memory changed, so the failure is not a write-through.
        let err = store.trust().remove(&addr(9)).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
