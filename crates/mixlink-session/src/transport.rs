//! Transport collaborator contract.
//!
//! The mix-network client (packet construction, link encryption, PKI, provider
//! routing) lives outside this crate. A session talks to it only through these
//! traits, and the transport talks back only through [`MessageConsumer`] and
//! [`IdentityResolver`].

use std::fmt;
use std::sync::Arc;

use mixlink_core::{Keypair, MessageId, PublicKey};

use crate::block_store::BlockStore;
use crate::error::TransportError;
use crate::resolver::IdentityResolver;

/// Factory for transport sessions. One call per successful `connect`.
pub trait Transport: Send + Sync {
    fn new_session(&self, params: SessionParams) -> Result<Arc<dyn TransportSession>, TransportError>;
}

/// A live transport session with a provider.
///
/// `send` and `send_unreliable` only enqueue; they must not wait for the
/// network. A transport may invoke consumer callbacks from inside `send`.
pub trait TransportSession: Send + Sync {
    /// Enqueue a reliable message. The provider's acknowledgment comes back
    /// through [`MessageConsumer::received_ack`] carrying the same `id`.
    fn send(
        &self,
        id: &MessageId,
        recipient: &str,
        provider: &str,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Enqueue a best-effort message. No acknowledgment follows.
    fn send_unreliable(
        &self,
        recipient: &str,
        provider: &str,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Tear down the session. Called at most once.
    fn shutdown(&self) -> Result<(), TransportError>;
}

/// Callbacks the transport invokes when data arrives.
///
/// Implementations are called off the application's call path and must
/// return promptly.
pub trait MessageConsumer: Send + Sync {
    /// A plaintext message was delivered. `sender` is absent for anonymous senders.
    fn received_message(&self, sender: Option<PublicKey>, payload: &[u8]);

    /// The recipient's provider confirmed receipt of message `id`.
    fn received_ack(&self, id: &MessageId, payload: &[u8]);
}

/// Everything the transport needs to open a session, including the
/// callback targets it registers.
pub struct SessionParams {
    pub user: String,
    pub provider: String,
    pub identity_key: Arc<Keypair>,
    pub link_key: Arc<Keypair>,
    pub consumer: Arc<dyn MessageConsumer>,
    pub resolver: Arc<dyn IdentityResolver>,
    pub block_store: Arc<dyn BlockStore>,
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("user", &self.user)
            .field("provider", &self.provider)
            .field("identity_key", &self.identity_key.public())
            .field("link_key", &self.link_key.public())
            .finish_non_exhaustive()
    }
}
