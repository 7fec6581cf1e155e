//! The encryption orchestrator.
//!
//! `OmemoManager` turns "send this text to this account" into either an
//! encrypted envelope fanned out to every recipient device or an explicit
//! plaintext fallback. Sending never fails: whatever goes wrong on the
//! encrypted path (no identity, discovery down, no sessions possible), the
//! message still leaves as plaintext and the degradation is logged. Callers
//! that must not leak plaintext check [`OutboundMessage::is_encrypted`]
//! before dispatching.

use std::collections::HashSet;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use tracing::{debug, warn};

use tern_crypto::{prekeys::generate_prekeys, LocalIdentity, SignedPreKeyRecord};
use tern_proto::{
    DeviceAddress, Envelope, OneTimePreKeyPublic, OutboundMessage, PreKeyBundle,
    SignedPreKeyPublic, ENVELOPE_VERSION,
};
use tern_store::{Store, StoreError};

use crate::config::OmemoConfig;
use crate::discovery::DeviceDiscovery;
use crate::engine::CipherEngine;

/// Orchestrates identity, bundles, and the encrypt-or-fall-back send path.
///
/// Cheap to clone; all clones share the same store, engine, and discovery.
#[derive(Clone)]
pub struct OmemoManager {
    store: Store,
    engine: Arc<dyn CipherEngine>,
    discovery: Arc<dyn DeviceDiscovery>,
    config: OmemoConfig,
}

impl OmemoManager {
    pub fn new(
        store: Store,
        engine: Arc<dyn CipherEngine>,
        discovery: Arc<dyn DeviceDiscovery>,
        config: OmemoConfig,
    ) -> Self {
        Self { store, engine, discovery, config }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The local identity, generated and persisted on first call.
    ///
    /// Safe to call concurrently: the store accepts exactly one identity,
    /// and a caller that loses the generation race adopts the winner's.
    pub async fn ensure_identity(&self) -> Result<Arc<LocalIdentity>, StoreError> {
        if let Some(identity) = self.store.identity().get().await {
            return Ok(identity);
        }
        let fresh = LocalIdentity::generate()?;
        match self.store.identity().save(fresh).await {
            Ok(identity) => {
                debug!(device_id = identity.device_id, "generated local identity");
                Ok(identity)
            }
            Err(StoreError::IdentityExists) => self
                .store
                .identity()
                .get()
                .await
                .ok_or_else(|| StoreError::NotFound("local identity".into())),
            Err(e) => Err(e),
        }
    }

    /// Build the pre-key bundle this device publishes on connect.
    ///
    /// Generates whatever is missing first: the identity itself, a signed
    /// pre-key when none exists, and enough one-time pre-keys to get back
    /// to the configured count. Replacement one-time pre-keys continue the
    /// id sequence; ids are never reused within a device's lifetime.
    pub async fn publish_bundle(&self) -> Result<PreKeyBundle, StoreError> {
        let identity = self.ensure_identity().await?;

        let signed = match self.store.signed_prekeys().latest().await {
            Some(record) => record,
            None => {
                let record = SignedPreKeyRecord::generate(
                    &identity.key_pair,
                    self.config.signed_prekey_id_start,
                );
                self.store.signed_prekeys().save(record).await?
            }
        };

        let have = self.store.prekeys().count().await;
        let missing = (self.config.prekey_count as usize).saturating_sub(have) as u32;
        if missing > 0 {
            let start = self.store.prekeys().next_id(self.config.prekey_id_start).await;
            debug!(count = missing, start_id = start, "replenishing one-time pre-keys");
            for record in generate_prekeys(start, missing) {
                self.store.prekeys().save(record).await?;
            }
        }

        let prekeys = self
            .store
            .prekeys()
            .all()
            .await
            .iter()
            .map(|record| OneTimePreKeyPublic {
                id: record.id,
                opk_pub: URL_SAFE_NO_PAD.encode(record.public_bytes()),
            })
            .collect();

        Ok(PreKeyBundle {
            device_id: identity.device_id,
            ik_pub: identity.key_pair.public_b64(),
            signed_prekey: SignedPreKeyPublic {
                id: signed.id,
                spk_pub: URL_SAFE_NO_PAD.encode(signed.public_bytes()),
                spk_sig: URL_SAFE_NO_PAD.encode(&signed.signature),
            },
            prekeys,
        })
    }

    /// Encrypt `body` to every device of the bare JID `to`.
    ///
    /// Infallible by contract: any failure on the encrypted path downgrades
    /// the message to plaintext rather than losing it. The device set is
    /// the discovery result minus this device's own id, de-duplicated and
    /// ordered by device id, and the engine sees it in exactly one call so
    /// all devices share a single IV and ciphertext.
    pub async fn encrypt_message(&self, to: &str, body: &str) -> OutboundMessage {
        let identity = match self.ensure_identity().await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "no usable local identity; sending plaintext");
                return OutboundMessage::plaintext(to, body);
            }
        };

        let device_ids = match self.discovery.list_devices(to).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(to, error = %e, "device discovery failed; sending plaintext");
                return OutboundMessage::plaintext(to, body);
            }
        };

        // Own device id drops out even when sending to our own account;
        // other devices of this account are legitimate recipients.
        let mut devices: Vec<DeviceAddress> = device_ids
            .into_iter()
            .filter(|id| *id != identity.device_id)
            .map(|id| DeviceAddress::new(to, id))
            .collect();
        devices.sort_by_key(|d| d.device_id);
        devices.dedup();

        if devices.is_empty() {
            debug!(to, "recipient has no encryption-capable devices; sending plaintext");
            return OutboundMessage::plaintext(to, body);
        }

        let pinned: HashSet<u32> = self
            .store
            .trust()
            .identities_for_jid(to)
            .await
            .iter()
            .map(|r| r.address.device_id)
            .collect();
        let unpinned = devices.iter().filter(|d| !pinned.contains(&d.device_id)).count();

        match self.engine.encrypt(&devices, body.as_bytes(), &identity).await {
            Ok(payload) => {
                debug!(
                    to,
                    devices = devices.len(),
                    new_devices = unpinned,
                    "encrypted message for recipient devices"
                );
                let envelope = Envelope {
                    version: ENVELOPE_VERSION,
                    sid: identity.device_id,
                    keys: payload.keys,
                    iv: payload.iv,
                    payload: payload.ciphertext,
                };
                OutboundMessage::encrypted(to, envelope)
            }
            Err(e) => {
                warn!(to, error = %e, "recipient not ready for encryption; sending plaintext");
                OutboundMessage::plaintext(to, body)
            }
        }
    }

    /// Deliberately unencrypted message. Same id scheme as the encrypted
    /// path, so transcript ordering cannot tell the two apart.
    pub fn plaintext_message(&self, to: &str, body: &str) -> OutboundMessage {
        OutboundMessage::plaintext(to, body)
    }
}
