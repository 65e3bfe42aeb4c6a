//! mixlink-core: shared types, keys, payload rules, and configuration.
//! The session crate and the CLI both depend on this one.

pub mod config;
pub mod crypto;
pub mod message;
pub mod payload;

pub use crypto::{Keypair, PublicKey};
pub use message::MessageId;
pub use payload::EncodingError;
