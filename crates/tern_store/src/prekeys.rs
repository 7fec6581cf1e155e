//! One-time and signed pre-key stores.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use tern_crypto::{PreKeyRecord, SignedPreKeyRecord};

use crate::{backend::SharedBackend, error::StoreError};

// ── One-time pre-keys ─────────────────────────────────────────────────────────

#[derive(Default)]
struct PreKeyMap {
    records: HashMap<u32, Arc<PreKeyRecord>>,
    /// High-water mark of every id ever stored, seeded from the backend's
    /// durable allocation counter at open. Top-ups allocate above it so a
    /// consumed id is never reissued, even after its row was deleted and
    /// the store reopened.
    highest_id: u32,
}

/// One-time pre-keys, indexed by id. Each record serves exactly one session
/// bootstrap and is removed as soon as a peer has consumed it.
pub struct PreKeyStore {
    inner: RwLock<PreKeyMap>,
    backend: Option<SharedBackend>,
}

impl PreKeyStore {
    pub(crate) fn new(backend: Option<SharedBackend>) -> Self {
        Self {
            inner: RwLock::new(PreKeyMap::default()),
            backend,
        }
    }

    pub(crate) async fn load(&self, records: Vec<PreKeyRecord>, watermark: u32) {
        let mut inner = self.inner.write().await;
        inner.highest_id = watermark;
        for record in records {
            inner.highest_id = inner.highest_id.max(record.id);
            inner.records.insert(record.id, Arc::new(record));
        }
    }

    /// Fails with `NotFound` when the id is unknown — either never
    /// generated or already consumed.
    pub async fn get(&self, id: u32) -> Result<Arc<PreKeyRecord>, StoreError> {
        let inner = self.inner.read().await;
        inner
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("prekey {id}")))
    }

    pub async fn save(&self, record: PreKeyRecord) -> Result<Arc<PreKeyRecord>, StoreError> {
        let mut inner = self.inner.write().await;
        let record = Arc::new(record);
        inner.highest_id = inner.highest_id.max(record.id);
        inner.records.insert(record.id, record.clone());
        if let Some(backend) = &self.backend {
            backend
                .upsert_prekey(&record)
                .await
                .map_err(StoreError::into_write_through)?;
        }
        Ok(record)
    }

    /// Deleting a consumed pre-key is mandatory for forward secrecy; the
    /// operation itself is idempotent.
    pub async fn remove(&self, id: u32) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let had_record = inner.records.remove(&id).is_some();
        if let Some(backend) = &self.backend {
            let result = backend.delete_prekey(id).await;
            if had_record {
                result.map_err(StoreError::into_write_through)?;
            } else {
                result?;
            }
        }
        Ok(())
    }

    /// How many unconsumed pre-keys remain. Drives bundle top-up.
    pub async fn count(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// First id a fresh batch may use: one past the high-water mark, or
    /// `fallback_start` when nothing was ever stored.
    pub async fn next_id(&self, fallback_start: u32) -> u32 {
        let inner = self.inner.read().await;
        if inner.highest_id == 0 {
            fallback_start
        } else {
            inner.highest_id.saturating_add(1)
        }
    }

    /// Every live record, ordered by id (bundle assembly).
    pub async fn all(&self) -> Vec<Arc<PreKeyRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<Arc<PreKeyRecord>> = inner.records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

// ── Signed pre-keys ───────────────────────────────────────────────────────────

/// Signed pre-keys, indexed by id. Never removed: rotation stores a
/// replacement under a fresh id and handshakes against the old one keep
/// completing until the peer catches up.
pub struct SignedPreKeyStore {
    records: RwLock<HashMap<u32, Arc<SignedPreKeyRecord>>>,
    backend: Option<SharedBackend>,
}

impl SignedPreKeyStore {
    pub(crate) fn new(backend: Option<SharedBackend>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            backend,
        }
    }

    pub(crate) async fn load(&self, records: Vec<SignedPreKeyRecord>) {
        let mut map = self.records.write().await;
        for record in records {
            map.insert(record.id, Arc::new(record));
        }
    }

    /// Fails with `NotFound` when the id is unknown.
    pub async fn get(&self, id: u32) -> Result<Arc<SignedPreKeyRecord>, StoreError> {
        let map = self.records.read().await;
        map.get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("signed prekey {id}")))
    }

    pub async fn save(
        &self,
        record: SignedPreKeyRecord,
    ) -> Result<Arc<SignedPreKeyRecord>, StoreError> {
        let mut map = self.records.write().await;
        let record = Arc::new(record);
        map.insert(record.id, record.clone());
        if let Some(backend) = &self.backend {
            backend
                .upsert_signed_prekey(&record)
                .await
                .map_err(StoreError::into_write_through)?;
        }
        Ok(record)
    }

    /// The newest record — the one bundles advertise.
    pub async fn latest(&self) -> Option<Arc<SignedPreKeyRecord>> {
        let map = self.records.read().await;
        map.values()
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
    }
}
