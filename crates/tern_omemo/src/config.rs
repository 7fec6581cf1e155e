use serde::{Deserialize, Serialize};

/// Tunables for bundle publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OmemoConfig {
    /// Target number of one-time pre-keys kept published. Bundles are
    /// topped back up to this count as peers consume keys.
    pub prekey_count: u32,
    /// First id assigned when the one-time pre-key store is empty.
    pub prekey_id_start: u32,
    /// First id assigned when no signed pre-key exists yet.
    pub signed_prekey_id_start: u32,
}

impl Default for OmemoConfig {
    fn default() -> Self {
        Self {
            prekey_count: 100,
            prekey_id_start: 1,
            signed_prekey_id_start: 1,
        }
    }
}
