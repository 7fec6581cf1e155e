//! Remote identity pinning and trust levels.
//!
//! Trust-on-first-use: the first key observed for a device address is
//! accepted unconditionally and pinned; every later observation is compared
//! against the pin. A mismatch means rotation or impersonation, and which
//! of the two it is can only be decided by the user, so this store reports
//! the mismatch and changes nothing on its own.
//!
//! The trust level is advisory metadata for the verification UI. Nothing in
//! this subsystem gates encryption on it; an `Undecided` device is fully
//! usable, and no operation ever demotes a level implicitly.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use tern_crypto::IdentityKey;
use tern_proto::DeviceAddress;

use crate::{backend::SharedBackend, error::StoreError};

/// How far the user has gone in vouching for a device key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    /// Pinned on first use; the user has taken no action yet. Usable for
    /// encryption.
    Undecided,
    /// Accepted by the user without an out-of-band check.
    Trusted,
    /// Fingerprint compared out of band.
    Verified,
    /// Explicitly rejected by the user.
    Untrusted,
}

impl Default for TrustLevel {
    fn default() -> Self {
        TrustLevel::Undecided
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrustLevel::Undecided => "undecided",
            TrustLevel::Trusted => "trusted",
            TrustLevel::Verified => "verified",
            TrustLevel::Untrusted => "untrusted",
        };
        f.write_str(s)
    }
}

impl FromStr for TrustLevel {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, StoreError> {
        match s {
            "undecided" => Ok(TrustLevel::Undecided),
            "trusted" => Ok(TrustLevel::Trusted),
            "verified" => Ok(TrustLevel::Verified),
            "untrusted" => Ok(TrustLevel::Untrusted),
            other => Err(StoreError::InvalidValue(format!("trust level '{other}'"))),
        }
    }
}

/// One pinned remote device key with its trust state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub address: DeviceAddress,
    pub identity_key: IdentityKey,
    pub trust: TrustLevel,
    pub first_seen: DateTime<Utc>,
}

/// Authoritative map from device address to pinned key + trust level.
///
/// Shared-read/exclusive-write over the whole map. The durable write (when
/// a backend is attached) happens inside the write lock, so no reader ever
/// observes memory ahead of an acknowledged mutation.
pub struct TrustStore {
    identities: RwLock<HashMap<DeviceAddress, RemoteIdentity>>,
    backend: Option<SharedBackend>,
}

impl TrustStore {
    pub(crate) fn new(backend: Option<SharedBackend>) -> Self {
        Self {
            identities: RwLock::new(HashMap::new()),
            backend,
        }
    }

    pub(crate) async fn load(&self, rows: Vec<RemoteIdentity>) {
        let mut map = self.identities.write().await;
        for identity in rows {
            map.insert(identity.address.clone(), identity);
        }
    }

    /// Upsert the observed key for an address. A brand-new address is pinned
    /// at `Undecided` with `first_seen = now`; an existing record keeps its
    /// trust level and first-seen time even when the key changes. Whether a
    /// changed key is acceptable is the caller's policy, not this store's.
    pub async fn save_remote_identity(
        &self,
        addr: &DeviceAddress,
        key: &IdentityKey,
    ) -> Result<(), StoreError> {
        let mut map = self.identities.write().await;
        let record = match map.get_mut(addr) {
            Some(existing) => {
                existing.identity_key = key.clone();
                existing.clone()
            }
            None => {
                let record = RemoteIdentity {
                    address: addr.clone(),
                    identity_key: key.clone(),
                    trust: TrustLevel::Undecided,
                    first_seen: Utc::now(),
                };
                map.insert(addr.clone(), record.clone());
                record
            }
        };
        if let Some(backend) = &self.backend {
            backend
                .upsert_remote_identity(&record)
                .await
                .map_err(StoreError::into_write_through)?;
        }
        Ok(())
    }

    /// TOFU check: trusted when the address is unknown (first use) or when
    /// the pinned key matches. False on mismatch. Pure comparison; never
    /// mutates.
    pub async fn is_trusted(&self, addr: &DeviceAddress, key: &IdentityKey) -> bool {
        let map = self.identities.read().await;
        match map.get(addr) {
            Some(record) => record.identity_key == *key,
            None => true,
        }
    }

    /// Trust level for an address; unknown addresses are `Undecided`.
    pub async fn trust_level(&self, addr: &DeviceAddress) -> TrustLevel {
        let map = self.identities.read().await;
        map.get(addr).map(|r| r.trust).unwrap_or_default()
    }

    /// Record an explicit user trust decision. The address must already
    /// have a pinned key; a `RemoteIdentity` cannot exist without one.
    pub async fn set_trust_level(
        &self,
        addr: &DeviceAddress,
        level: TrustLevel,
    ) -> Result<(), StoreError> {
        let mut map = self.identities.write().await;
        let record = map
            .get_mut(addr)
            .ok_or_else(|| StoreError::NotFound(format!("remote identity {addr}")))?;
        record.trust = level;
        let snapshot = record.clone();
        if let Some(backend) = &self.backend {
            backend
                .upsert_remote_identity(&snapshot)
                .await
                .map_err(StoreError::into_write_through)?;
        }
        Ok(())
    }

    /// Drop the pinned identity for an address. Safe to call for addresses
    /// that were never pinned; the backend delete still runs so a retry
    /// after a failed write-through converges.
    pub async fn remove(&self, addr: &DeviceAddress) -> Result<(), StoreError> {
        let mut map = self.identities.write().await;
        let had_record = map.remove(addr).is_some();
        if let Some(backend) = &self.backend {
            let result = backend.delete_remote_identity(addr).await;
            if had_record {
                result.map_err(StoreError::into_write_through)?;
            } else {
                result?;
            }
        }
        Ok(())
    }

    /// All known devices of a bare JID with their trust resolved, ordered
    /// by device id. Feeds the orchestrator's device set and the
    /// verification UI.
    pub async fn identities_for_jid(&self, jid: &str) -> Vec<RemoteIdentity> {
        let map = self.identities.read().await;
        let mut rows: Vec<RemoteIdentity> = map
            .values()
            .filter(|r| r.address.jid == jid)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.address.device_id);
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(device_id: u32) -> DeviceAddress {
        DeviceAddress::new("bob@example.com", device_id)
    }

    fn key(fill: u8) -> IdentityKey {
        IdentityKey(vec![fill; 32])
    }

    #[tokio::test]
    async fn unknown_address_is_trusted_by_default() {
        let store = TrustStore::new(None);
        assert!(store.is_trusted(&addr(1), &key(0x01)).await);
    }

    #[tokio::test]
    async fn pinned_key_matches_and_mismatches() {
        let store = TrustStore::new(None);
        store.save_remote_identity(&addr(1), &key(0x01)).await.unwrap();

        assert!(store.is_trusted(&addr(1), &key(0x01)).await);
        assert!(!store.is_trusted(&addr(1), &key(0x02)).await);
        // Other devices of the same account are unaffected.
        assert!(store.is_trusted(&addr(2), &key(0x02)).await);
    }

    #[tokio::test]
    async fn first_contact_pins_at_undecided() {
        let store = TrustStore::new(None);
        store.save_remote_identity(&addr(1), &key(0x01)).await.unwrap();
        assert_eq!(store.trust_level(&addr(1)).await, TrustLevel::Undecided);
    }

    #[tokio::test]
    async fn key_rotation_preserves_trust_and_first_seen() {
        let store = TrustStore::new(None);
        store.save_remote_identity(&addr(1), &key(0x01)).await.unwrap();
        store.set_trust_level(&addr(1), TrustLevel::Verified).await.unwrap();
        let before = store.identities_for_jid("bob@example.com").await[0].first_seen;

        store.save_remote_identity(&addr(1), &key(0x02)).await.unwrap();

        let rows = store.identities_for_jid("bob@example.com").await;
        assert_eq!(rows[0].identity_key, key(0x02));
        assert_eq!(rows[0].trust, TrustLevel::Verified);
        assert_eq!(rows[0].first_seen, before);
    }

    #[tokio::test]
    async fn set_trust_level_requires_a_pinned_key() {
        let store = TrustStore::new(None);
        let err = store.set_trust_level(&addr(9), TrustLevel::Trusted).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn identities_for_jid_filters_and_sorts() {
        let store = TrustStore::new(None);
        store.save_remote_identity(&addr(7), &key(0x07)).await.unwrap();
        store.save_remote_identity(&addr(2), &key(0x02)).await.unwrap();
        store
            .save_remote_identity(&DeviceAddress::new("carol@example.com", 1), &key(0x0C))
            .await
            .unwrap();

        let rows = store.identities_for_jid("bob@example.com").await;
        let ids: Vec<u32> = rows.iter().map(|r| r.address.device_id).collect();
        assert_eq!(ids, vec![2, 7]);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = TrustStore::new(None);
        store.save_remote_identity(&addr(1), &key(0x01)).await.unwrap();

        store.remove(&addr(1)).await.unwrap();
        store.remove(&addr(1)).await.unwrap();

        assert!(store.identities_for_jid("bob@example.com").await.is_empty());
        assert_eq!(store.trust_level(&addr(1)).await, TrustLevel::Undecided);
    }

    #[test]
    fn trust_level_text_roundtrip() {
        for level in [
            TrustLevel::Undecided,
            TrustLevel::Trusted,
            TrustLevel::Verified,
            TrustLevel::Untrusted,
        ] {
            assert_eq!(level.to_string().parse::<TrustLevel>().unwrap(), level);
        }
        assert!("suspicious".parse::<TrustLevel>().is_err());
    }
}
