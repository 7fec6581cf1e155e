//! Opaque ratchet session cache.
//!
//! Session state belongs to the cipher engine; this cache stores and
//! returns the bytes verbatim, one blob per device address. Absence is a
//! distinct error (`NoSession`) because it is what tells the engine to run
//! a pre-key handshake instead of a normal ratchet step.

use std::collections::HashMap;

use tokio::sync::RwLock;

use tern_proto::DeviceAddress;

use crate::{backend::SharedBackend, error::StoreError};

pub struct SessionStore {
    sessions: RwLock<HashMap<DeviceAddress, Vec<u8>>>,
    backend: Option<SharedBackend>,
}

impl SessionStore {
    pub(crate) fn new(backend: Option<SharedBackend>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            backend,
        }
    }

    pub(crate) async fn load(&self, rows: Vec<(DeviceAddress, Vec<u8>)>) {
        let mut map = self.sessions.write().await;
        for (addr, state) in rows {
            map.insert(addr, state);
        }
    }

    /// Current session bytes. Fails with `NoSession` when the device has
    /// none.
    pub async fn get(&self, addr: &DeviceAddress) -> Result<Vec<u8>, StoreError> {
        let map = self.sessions.read().await;
        map.get(addr)
            .cloned()
            .ok_or_else(|| StoreError::NoSession(addr.clone()))
    }

    /// Store a session snapshot. The bytes are copied; later edits to the
    /// caller's buffer never reach the cache.
    pub async fn save(&self, addr: &DeviceAddress, state: &[u8]) -> Result<(), StoreError> {
        let mut map = self.sessions.write().await;
        map.insert(addr.clone(), state.to_vec());
        if let Some(backend) = &self.backend {
            backend
                .upsert_session(addr, state)
                .await
                .map_err(StoreError::into_write_through)?;
        }
        Ok(())
    }

    /// Existence check used to decide whether a fresh handshake is needed
    /// before encrypting.
    pub async fn contains(&self, addr: &DeviceAddress) -> bool {
        self.sessions.read().await.contains_key(addr)
    }

    /// Idempotent delete (device removal or session re-establishment).
    pub async fn remove(&self, addr: &DeviceAddress) -> Result<(), StoreError> {
        let mut map = self.sessions.write().await;
        let had_record = map.remove(addr).is_some();
        if let Some(backend) = &self.backend {
            let result = backend.delete_session(addr).await;
            if had_record {
                result.map_err(StoreError::into_write_through)?;
            } else {
                result?;
            }
        }
        Ok(())
    }

    /// Devices of `jid` that currently have a live session, ordered by
    /// device id. The engine uses this to tell ratchet steps from pre-key
    /// handshakes when fanning out.
    pub async fn addresses_for_jid(&self, jid: &str) -> Vec<DeviceAddress> {
        let map = self.sessions.read().await;
        let mut addrs: Vec<DeviceAddress> = map
            .keys()
            .filter(|a| a.jid == jid)
            .cloned()
            .collect();
        addrs.sort_by_key(|a| a.device_id);
        addrs
    }
}
