//! Routes transport callbacks into session state.
//!
//! The dispatcher is what the transport holds as its message consumer. It
//! only takes the session lock long enough to enqueue a message or settle a
//! pending send; it never waits for the application.

use std::sync::Weak;

use bytes::Bytes;
use mixlink_core::{MessageId, PublicKey};

use crate::ingress::{InboundMessage, Offer};
use crate::session::Shared;
use crate::transport::MessageConsumer;

/// Transport-facing callback surface of a session.
///
/// Holds a weak reference so the transport's copy does not keep a dropped
/// session alive.
#[derive(Clone)]
pub struct InboundDispatcher {
    shared: Weak<Shared>,
}

impl InboundDispatcher {
    pub(crate) fn new(shared: Weak<Shared>) -> Self {
        Self { shared }
    }
}

impl MessageConsumer for InboundDispatcher {
    fn received_message(&self, sender: Option<PublicKey>, payload: &[u8]) {
        let Some(shared) = self.shared.upgrade() else {
            tracing::debug!("message for dropped session discarded");
            return;
        };

        let message = InboundMessage {
            sender,
            payload: Bytes::copy_from_slice(payload),
        };
        let (offer, queued, dropped) = {
            let mut state = shared.lock();
            let offer = state.ingress.push(message);
            (offer, state.ingress.len(), state.ingress.dropped())
        };

        match offer {
            Offer::Queued => {
                shared.ingress_ready.notify_one();
                tracing::debug!(parent: &shared.span, len = payload.len(), queued, "message received");
            }
            Offer::Dropped => {
                tracing::warn!(
                    parent: &shared.span,
                    len = payload.len(),
                    queued,
                    dropped,
                    "ingress queue full, dropping newest message"
                );
            }
            Offer::Closed => {
                tracing::debug!(parent: &shared.span, "message after shutdown discarded");
            }
        }
    }

    fn received_ack(&self, id: &MessageId, payload: &[u8]) {
        let Some(shared) = self.shared.upgrade() else {
            tracing::debug!(message_id = %id, "ack for dropped session discarded");
            return;
        };

        let settled = shared.lock().pending.acknowledge(id, payload);
        match settled {
            Some(entry) => tracing::debug!(
                parent: &shared.span,
                message_id = %id,
                recipient = %entry.recipient,
                provider = %entry.provider,
                latency_ms = entry.sent_at.elapsed().as_millis() as u64,
                "delivery acknowledged"
            ),
            // Duplicate, late, or never issued. Expected under retransmission.
            None => tracing::debug!(
                parent: &shared.span,
                message_id = %id,
                "ack for unknown or settled message ignored"
            ),
        }
    }
}

impl std::fmt::Debug for InboundDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = self.shared.upgrade().map(|s| s.label.clone());
        f.debug_struct("InboundDispatcher")
            .field("session", &label)
            .finish()
    }
}
