//! Recipient device discovery.
//!
//! Which devices an account owns is server-side knowledge in a federated
//! network, so the lookup sits behind a trait. The in-tree implementation
//! answers from locally pinned identities, which keeps previously seen
//! contacts reachable while offline.

use async_trait::async_trait;
use thiserror::Error;

use tern_store::Store;

#[derive(Debug, Error)]
#[error("Device discovery: {0}")]
pub struct DiscoveryError(pub String);

/// Source of the device-id list for a bare JID.
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    /// All known device ids of `jid`, in no particular order. May contain
    /// duplicates or the caller's own device; the orchestrator cleans the
    /// list up.
    async fn list_devices(&self, jid: &str) -> Result<Vec<u32>, DiscoveryError>;
}

/// Discovery backed by the local trust store: a device is known once its
/// identity key has been pinned.
pub struct PinnedDeviceDiscovery {
    store: Store,
}

impl PinnedDeviceDiscovery {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DeviceDiscovery for PinnedDeviceDiscovery {
    async fn list_devices(&self, jid: &str) -> Result<Vec<u32>, DiscoveryError> {
        Ok(self
            .store
            .trust()
            .identities_for_jid(jid)
            .await
            .into_iter()
            .map(|identity| identity.address.device_id)
            .collect())
    }
}
