//! Session: one authenticated client↔provider relationship.
//!
//! All mutable state (lifecycle, transport handle, ingress queue, pending
//! table) sits behind a single mutex. No transport call is made while that
//! mutex is held, since a transport may call back into the dispatcher from
//! inside `send`.
//!
//! Lifecycle: Unconnected → Connecting → Connected → ShutDown. ShutDown is
//! terminal; a session cannot be reconnected after it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use mixlink_core::config::SessionConfig;
use mixlink_core::payload::validate_payload;
use mixlink_core::{Keypair, MessageId, PublicKey};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::Span;

use crate::block_store::{BlockStore, StorageStub};
use crate::dispatch::InboundDispatcher;
use crate::error::SessionError;
use crate::ingress::{InboundMessage, IngressQueue};
use crate::pending::{DeliveryReceipt, DeliveryStatus, PendingSend, PendingTable};
use crate::resolver::{DirectoryResolver, IdentityResolver, KeyDirectory};
use crate::transport::{SessionParams, Transport, TransportSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unconnected,
    /// `connect` is building the transport session.
    Connecting,
    Connected,
    ShutDown,
}

/// External collaborators a session is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub directory: Arc<dyn KeyDirectory>,
    pub block_store: Arc<dyn BlockStore>,
}

impl Collaborators {
    /// Transport and directory, with the not-implemented block store.
    pub fn new(transport: Arc<dyn Transport>, directory: Arc<dyn KeyDirectory>) -> Self {
        Self {
            transport,
            directory,
            block_store: Arc::new(StorageStub),
        }
    }

    pub fn with_block_store(mut self, block_store: Arc<dyn BlockStore>) -> Self {
        self.block_store = block_store;
        self
    }
}

/// Point-in-time counters for a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session: String,
    pub state: SessionState,
    /// Reliable sends awaiting acknowledgment.
    pub pending: usize,
    /// Messages waiting in the ingress queue.
    pub queued: usize,
    /// Inbound messages dropped on overflow.
    pub dropped: u64,
    /// Acknowledgments matched.
    pub acked: u64,
}

pub(crate) struct State {
    pub(crate) lifecycle: SessionState,
    pub(crate) transport: Option<Arc<dyn TransportSession>>,
    pub(crate) ingress: IngressQueue,
    pub(crate) pending: PendingTable,
}

impl State {
    /// The live transport, or the error a send should fail with.
    fn connected_transport(&self) -> Result<Arc<dyn TransportSession>, SessionError> {
        match self.lifecycle {
            SessionState::ShutDown => Err(SessionError::SessionClosed),
            SessionState::Unconnected | SessionState::Connecting => Err(SessionError::NotConnected),
            SessionState::Connected => self
                .transport
                .clone()
                .ok_or(SessionError::NotConnected),
        }
    }
}

/// State shared between the session handles and the dispatcher.
pub(crate) struct Shared {
    pub(crate) label: String,
    pub(crate) span: Span,
    pub(crate) state: Mutex<State>,
    /// Signalled on every enqueue and on shutdown.
    pub(crate) ingress_ready: Notify,
}

impl Shared {
    /// Every critical section leaves `State` consistent, so a poisoned lock
    /// is still safe to use.
    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(transport) = state.transport.take() {
            tracing::debug!(parent: &self.span, "session dropped while connected, tearing down transport");
            if let Err(e) = transport.shutdown() {
                tracing::warn!(parent: &self.span, error = %e, "transport teardown failed");
            }
        }
    }
}

/// Application handle to a session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
    config: Arc<SessionConfig>,
    collaborators: Collaborators,
}

impl Session {
    /// Create an unconnected session logging under a `session` span for `user@provider`.
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Self {
        let span = tracing::info_span!("session", session = %config.label());
        Self::with_span(config, collaborators, span)
    }

    /// Create an unconnected session that logs under the given span.
    pub fn with_span(config: SessionConfig, collaborators: Collaborators, span: Span) -> Self {
        if config.ingress_capacity == 0 {
            tracing::warn!(parent: &span, "ingress capacity 0 is unusable, using 1");
        }
        let state = State {
            lifecycle: SessionState::Unconnected,
            transport: None,
            ingress: IngressQueue::new(config.ingress_capacity),
            pending: PendingTable::new(),
        };
        let shared = Arc::new(Shared {
            label: config.label(),
            span,
            state: Mutex::new(state),
            ingress_ready: Notify::new(),
        });
        Self {
            shared,
            config: Arc::new(config),
            collaborators,
        }
    }

    /// `user@provider`.
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn span(&self) -> &Span {
        &self.shared.span
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().lifecycle
    }

    /// The callback target registered with the transport. Exposed so that
    /// embedders driving their own transport can feed it directly.
    pub fn dispatcher(&self) -> InboundDispatcher {
        InboundDispatcher::new(Arc::downgrade(&self.shared))
    }

    /// Establish the transport session, registering this session as the
    /// message consumer and identity resolver.
    pub fn connect(&self, identity_key: Arc<Keypair>) -> Result<(), SessionError> {
        let span = &self.shared.span;
        {
            let mut state = self.shared.lock();
            match state.lifecycle {
                SessionState::Unconnected => state.lifecycle = SessionState::Connecting,
                SessionState::Connecting | SessionState::Connected => {
                    return Err(SessionError::AlreadyConnected)
                }
                SessionState::ShutDown => return Err(SessionError::SessionClosed),
            }
        }

        let params = SessionParams {
            user: self.config.user.clone(),
            provider: self.config.provider.clone(),
            identity_key,
            link_key: self.config.link_key.clone(),
            consumer: Arc::new(self.dispatcher()),
            resolver: Arc::new(self.resolver()),
            block_store: self.collaborators.block_store.clone(),
        };

        let transport = match self.collaborators.transport.new_session(params) {
            Ok(t) => t,
            Err(e) => {
                let mut state = self.shared.lock();
                if state.lifecycle == SessionState::Connecting {
                    state.lifecycle = SessionState::Unconnected;
                }
                tracing::warn!(parent: span, error = %e, "connect failed");
                return Err(SessionError::Connect(e));
            }
        };

        {
            let mut state = self.shared.lock();
            if state.lifecycle == SessionState::Connecting {
                state.lifecycle = SessionState::Connected;
                state.transport = Some(transport);
                tracing::info!(parent: span, "connected");
                return Ok(());
            }
        }

        // Shut down while we were connecting; the new transport session is orphaned.
        if let Err(e) = transport.shutdown() {
            tracing::warn!(parent: span, error = %e, "teardown of orphaned transport session failed");
        }
        Err(SessionError::SessionClosed)
    }

    /// Send reliably. Returns as soon as the transport has enqueued the
    /// message; the receipt resolves when the provider acknowledges it.
    pub fn send(
        &self,
        recipient: &str,
        provider: &str,
        payload: &[u8],
    ) -> Result<DeliveryReceipt, SessionError> {
        let span = &self.shared.span;
        let (transport, id, receipt) = {
            let mut state = self.shared.lock();
            let transport = state.connected_transport()?;
            validate_payload(payload, self.config.max_payload_len)?;

            let receipt = loop {
                let (entry, receipt) = PendingSend::new(
                    MessageId::generate(),
                    recipient,
                    provider,
                    Bytes::copy_from_slice(payload),
                );
                if state.pending.insert(entry).is_ok() {
                    break receipt;
                }
                // Id collision with a pending send; draw again.
            };
            (transport, receipt.id(), receipt)
        };

        if let Err(e) = transport.send(&id, recipient, provider, payload) {
            self.shared.lock().pending.rollback(&id);
            tracing::warn!(parent: span, message_id = %id, recipient, provider, error = %e, "send failed");
            return Err(SessionError::Transport(e));
        }

        tracing::debug!(parent: span, message_id = %id, recipient, provider, "sent message");
        Ok(receipt)
    }

    /// Send best-effort. Nothing is tracked and no acknowledgment is expected.
    pub fn send_unreliable(
        &self,
        recipient: &str,
        provider: &str,
        payload: &[u8],
    ) -> Result<(), SessionError> {
        let transport = {
            let state = self.shared.lock();
            let transport = state.connected_transport()?;
            validate_payload(payload, self.config.max_payload_len)?;
            transport
        };
        transport
            .send_unreliable(recipient, provider, payload)
            .map_err(SessionError::Transport)?;
        tracing::debug!(parent: &self.shared.span, recipient, provider, "sent unreliable message");
        Ok(())
    }

    /// Wait for the next inbound message.
    ///
    /// Concurrent callers each get distinct messages. Fails with
    /// `SessionClosed` once the session is shut down, including for callers
    /// already waiting when it happens.
    pub async fn get_message(&self) -> Result<InboundMessage, SessionError> {
        loop {
            let notified = self.shared.ingress_ready.notified();
            {
                let mut state = self.shared.lock();
                if state.lifecycle == SessionState::ShutDown {
                    return Err(SessionError::SessionClosed);
                }
                if let Some(message) = state.ingress.pop() {
                    if !state.ingress.is_empty() {
                        // More waiting; pass the wakeup on to another consumer.
                        self.shared.ingress_ready.notify_one();
                    }
                    tracing::debug!(parent: &self.shared.span, "message dequeued");
                    return Ok(message);
                }
            }
            notified.await;
        }
    }

    /// Take the next inbound message if one is queued.
    pub fn try_get_message(&self) -> Result<Option<InboundMessage>, SessionError> {
        let mut state = self.shared.lock();
        if state.lifecycle == SessionState::ShutDown {
            return Err(SessionError::SessionClosed);
        }
        Ok(state.ingress.pop())
    }

    /// Look up a recipient's public key through the key directory.
    pub fn resolve(&self, identity: &str) -> Result<PublicKey, SessionError> {
        Ok(self.resolver().resolve(identity)?)
    }

    fn resolver(&self) -> DirectoryResolver {
        DirectoryResolver::new(self.collaborators.directory.clone(), self.shared.span.clone())
    }

    /// Status of a reliable send still in the pending table.
    /// `None` once it has been acknowledged or abandoned.
    pub fn delivery_status(&self, id: &MessageId) -> Option<DeliveryStatus> {
        self.shared.lock().pending.status(id)
    }

    pub fn stats(&self) -> SessionStats {
        let state = self.shared.lock();
        SessionStats {
            session: self.shared.label.clone(),
            state: state.lifecycle,
            pending: state.pending.len(),
            queued: state.ingress.len(),
            dropped: state.ingress.dropped(),
            acked: state.pending.acked(),
        }
    }

    /// Bring the session to its terminal state.
    ///
    /// Abandons every pending send, closes the ingress queue, wakes all
    /// waiting receivers, and tears down the transport session. Never fails;
    /// a teardown error is logged. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let span = &self.shared.span;
        let (transport, abandoned, discarded) = {
            let mut state = self.shared.lock();
            if state.lifecycle == SessionState::ShutDown {
                tracing::debug!(parent: span, "shutdown on closed session ignored");
                return;
            }
            state.lifecycle = SessionState::ShutDown;
            let abandoned = state.pending.abandon_all();
            let discarded = state.ingress.close();
            (state.transport.take(), abandoned, discarded)
        };

        self.shared.ingress_ready.notify_waiters();

        if let Some(transport) = transport {
            if let Err(e) = transport.shutdown() {
                tracing::warn!(parent: span, error = %e, "transport teardown failed, session closed anyway");
            }
        }

        tracing::info!(parent: span, abandoned, discarded, "session shut down");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("label", &self.shared.label)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
