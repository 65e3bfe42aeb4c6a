//! Message identifiers.
//!
//! A `MessageId` is assigned when a reliable send is issued and comes back
//! with the provider's acknowledgment. It is drawn from the thread RNG, never
//! derived from content, so two sends of the same payload get distinct ids.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque 16-byte correlation id for a reliably-sent message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId([u8; MessageId::LEN]);

impl MessageId {
    /// Length of a message id in bytes (the block layer's message-id length).
    pub const LEN: usize = 16;

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        let mut id = [0u8; Self::LEN];
        rand::thread_rng().fill_bytes(&mut id);
        Self(id)
    }

    pub const fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Parse a 32-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, MessageIdError> {
        let bytes = hex::decode(s).map_err(|_| MessageIdError::InvalidHex)?;
        let arr: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| MessageIdError::WrongLength(b.len()))?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", self.to_hex())
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageIdError {
    #[error("message id is not valid hex")]
    InvalidHex,
    #[error("message id must be 16 bytes, got {0}")]
    WrongLength(usize),
}
