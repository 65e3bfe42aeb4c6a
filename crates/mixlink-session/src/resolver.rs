//! Identity resolution: human-readable identity to routable public key.
//!
//! The transport asks the session for keys through [`IdentityResolver`].
//! The session answers by passing the question straight to the external
//! key directory. No caching here; a directory that wants a cache keeps its own.

use std::sync::Arc;

use dashmap::DashMap;
use mixlink_core::PublicKey;
use tracing::Span;

use crate::error::ResolveError;

/// Callback the transport uses to discover a recipient's key.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, identity: &str) -> Result<PublicKey, ResolveError>;
}

/// External directory collaborator.
pub trait KeyDirectory: Send + Sync {
    fn lookup(&self, identity: &str) -> Option<PublicKey>;
}

/// Pass-through resolver over a [`KeyDirectory`].
pub struct DirectoryResolver {
    directory: Arc<dyn KeyDirectory>,
    span: Span,
}

impl DirectoryResolver {
    pub fn new(directory: Arc<dyn KeyDirectory>, span: Span) -> Self {
        Self { directory, span }
    }
}

impl IdentityResolver for DirectoryResolver {
    fn resolve(&self, identity: &str) -> Result<PublicKey, ResolveError> {
        tracing::debug!(parent: &self.span, identity, "resolving identity");
        self.directory
            .lookup(identity)
            .ok_or_else(|| ResolveError::Unknown(identity.to_string()))
    }
}

/// In-memory directory for embedders that already know their contacts.
#[derive(Clone, Default)]
pub struct StaticDirectory {
    keys: Arc<DashMap<String, PublicKey>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: impl Into<String>, key: PublicKey) {
        self.keys.insert(identity.into(), key);
    }

    pub fn remove(&self, identity: &str) -> Option<PublicKey> {
        self.keys.remove(identity).map(|(_, key)| key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyDirectory for StaticDirectory {
    fn lookup(&self, identity: &str) -> Option<PublicKey> {
        self.keys.get(identity).map(|k| *k.value())
    }
}
