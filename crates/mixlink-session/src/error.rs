//! Error taxonomy for the session layer.
//!
//! `SessionError` is what the application sees. The other enums describe
//! collaborator failures and are wrapped into it where they cross the
//! application boundary.

use mixlink_core::{EncodingError, MessageId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport session could not be established. The session stays unconnected.
    #[error("connect failed: {0}")]
    Connect(#[source] TransportError),

    #[error("invalid payload: {0}")]
    Encoding(#[from] EncodingError),

    /// The transport refused to enqueue the message. Nothing is left pending.
    #[error("transport rejected send: {0}")]
    Transport(#[source] TransportError),

    #[error("unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("session is shut down")]
    SessionClosed,

    #[error("session is already connected")]
    AlreadyConnected,

    #[error("session is not connected")]
    NotConnected,
}

/// Failures reported by the transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("transport session closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no key found for {0}")]
    Unknown(String),
}

impl From<ResolveError> for SessionError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Unknown(identity) => SessionError::UnknownIdentity(identity),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("block storage not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("no blocks stored for message {0}")]
    NotFound(MessageId),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            context: context.into(),
            source,
        }
    }
}
