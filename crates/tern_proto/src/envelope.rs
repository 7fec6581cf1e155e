//! Encrypted message envelope and the outbound message wrapper.
//!
//! The envelope carries one message to every device of a recipient account:
//! the body is encrypted once with a fresh content key, and that key is
//! wrapped separately for each device's ratchet session. Servers and
//! non-supporting clients see only opaque base64.
//!
//! `OutboundMessage` is what the send path hands to the dispatch layer. It
//! is deliberately honest about degradation: a message that could not be
//! encrypted goes out as `MessageBody::Plaintext`, and callers that require
//! confidentiality-or-fail must check the variant rather than trust the
//! send path.

use serde::{Deserialize, Serialize};

pub const ENVELOPE_VERSION: u8 = 1;

/// Serde helper: raw bytes <-> base64url string on the wire.
mod b64 {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// The content key, wrapped for one recipient device's session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedKey {
    /// Recipient device id ("rid" on the wire).
    pub rid: u32,

    /// Content key encrypted to this device's ratchet session.
    #[serde(with = "b64")]
    pub key: Vec<u8>,

    /// True when this wrap doubles as a pre-key handshake message and has
    /// consumed one of the recipient's one-time pre-keys.
    #[serde(default)]
    pub prekey: bool,
}

/// On-wire envelope: per-device wrapped keys, one shared IV, one payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope format version for forward compatibility.
    pub version: u8,

    /// Sender's device id, so receivers can address the reply session.
    pub sid: u32,

    /// One wrapped copy of the content key per recipient device.
    pub keys: Vec<WrappedKey>,

    /// Initialisation vector shared by every recipient.
    #[serde(with = "b64")]
    pub iv: Vec<u8>,

    /// AEAD ciphertext of the message body.
    #[serde(with = "b64")]
    pub payload: Vec<u8>,
}

/// What an outgoing message actually carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Encrypted(Envelope),
    Plaintext { body: String },
}

/// One outgoing message as handed to the dispatch layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Message id. Same generation scheme whether the body ended up
    /// encrypted or plaintext.
    pub id: String,
    /// Bare JID of the recipient account.
    pub to: String,
    pub body: MessageBody,
}

impl OutboundMessage {
    /// Plaintext message: either user-requested or an encryption fallback.
    pub fn plaintext(to: &str, body: &str) -> Self {
        Self {
            id: new_message_id(),
            to: to.to_string(),
            body: MessageBody::Plaintext { body: body.to_string() },
        }
    }

    /// Encrypted message carrying an envelope as its sole content.
    pub fn encrypted(to: &str, envelope: Envelope) -> Self {
        Self {
            id: new_message_id(),
            to: to.to_string(),
            body: MessageBody::Encrypted(envelope),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.body, MessageBody::Encrypted(_))
    }
}

/// Message ids are random UUIDs regardless of how the body was produced.
fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
