//! The single local identity.

use std::sync::Arc;

use tokio::sync::RwLock;

use tern_crypto::LocalIdentity;

use crate::{backend::SharedBackend, error::StoreError};

/// Holds the one identity of this device. Immutable once saved: the pair
/// lives exactly as long as the device id does, and a second save is an
/// error rather than a silent replacement.
pub struct IdentityStore {
    identity: RwLock<Option<Arc<LocalIdentity>>>,
    backend: Option<SharedBackend>,
}

impl IdentityStore {
    pub(crate) fn new(backend: Option<SharedBackend>) -> Self {
        Self {
            identity: RwLock::new(None),
            backend,
        }
    }

    pub(crate) async fn load(&self, identity: Option<LocalIdentity>) {
        if let Some(identity) = identity {
            *self.identity.write().await = Some(Arc::new(identity));
        }
    }

    /// The local identity, if one was generated or loaded.
    pub async fn get(&self) -> Option<Arc<LocalIdentity>> {
        self.identity.read().await.clone()
    }

    /// Store the identity generated on a device's first connect.
    pub async fn save(&self, identity: LocalIdentity) -> Result<Arc<LocalIdentity>, StoreError> {
        let mut guard = self.identity.write().await;
        if guard.is_some() {
            return Err(StoreError::IdentityExists);
        }
        let identity = Arc::new(identity);
        *guard = Some(identity.clone());
        if let Some(backend) = &self.backend {
            backend
                .save_local_identity(&identity)
                .await
                .map_err(StoreError::into_write_through)?;
        }
        Ok(identity)
    }

    /// Fingerprint of the local public key for the verification UI:
    /// lower-case hex grouped every 8 characters by a single space.
    /// Fails with `NotFound` before the first-connect identity generation.
    pub async fn fingerprint(&self) -> Result<String, StoreError> {
        let guard = self.identity.read().await;
        let identity = guard
            .as_ref()
            .ok_or_else(|| StoreError::NotFound("local identity".into()))?;
        Ok(identity.fingerprint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_get_returns_same_identity() {
        let store = IdentityStore::new(None);
        assert!(store.get().await.is_none());

        let saved = store.save(LocalIdentity::generate().unwrap()).await.unwrap();
        let got = store.get().await.unwrap();
        assert_eq!(got.device_id, saved.device_id);
        assert_eq!(got.public_key(), saved.public_key());
    }

    #[tokio::test]
    async fn second_save_is_rejected() {
        let store = IdentityStore::new(None);
        store.save(LocalIdentity::generate().unwrap()).await.unwrap();

        let err = store.save(LocalIdentity::generate().unwrap()).await;
        assert!(matches!(err, Err(StoreError::IdentityExists)));
    }

    #[tokio::test]
    async fn fingerprint_matches_across_stores_loaded_with_same_key() {
        let identity = LocalIdentity::generate().unwrap();
        let secret = *identity.key_pair.secret_bytes();
        let device_id = identity.device_id;

        let a = IdentityStore::new(None);
        a.save(identity).await.unwrap();

        let b = IdentityStore::new(None);
        b.load(Some(LocalIdentity::from_parts(device_id, &secret).unwrap())).await;

        assert_eq!(a.fingerprint().await.unwrap(), b.fingerprint().await.unwrap());
    }

    #[tokio::test]
    async fn fingerprint_before_generation_is_not_found() {
        let store = IdentityStore::new(None);
        assert!(matches!(
            store.fingerprint().await,
            Err(StoreError::NotFound(_))
        ));
    }
}
