//! In-process loopback transport.
//!
//! Every connected session registers a mailbox under `user@provider`. A send
//! looks up the recipient's mailbox, hands it the payload with the sender's
//! identity key attached, and (for reliable sends) acknowledges the sender
//! with the same message id. There is no mixing, delay, or loss; this is for
//! tests and the CLI round-trip, not a network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use mixlink_core::{MessageId, PublicKey};

use crate::error::TransportError;
use crate::resolver::KeyDirectory;
use crate::transport::{MessageConsumer, SessionParams, Transport, TransportSession};

struct Mailbox {
    user: String,
    identity: PublicKey,
    consumer: Arc<dyn MessageConsumer>,
}

#[derive(Default)]
struct Network {
    mailboxes: DashMap<String, Mailbox>,
    withhold_acks: AtomicBool,
    // (sender address, message id) for acks not yet delivered
    withheld: Mutex<Vec<(String, MessageId)>>,
}

/// Shared loopback network. Clones refer to the same network.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    net: Arc<Network>,
}

fn address(user: &str, provider: &str) -> String {
    format!("{user}@{provider}")
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, user: &str, provider: &str) -> bool {
        self.net.mailboxes.contains_key(&address(user, provider))
    }

    pub fn registered(&self) -> usize {
        self.net.mailboxes.len()
    }

    /// Hold acknowledgments instead of delivering them on send.
    pub fn set_withhold_acks(&self, withhold: bool) {
        self.net
            .withhold_acks
            .store(withhold, Ordering::Relaxed);
    }

    /// Deliver every withheld acknowledgment. Returns how many were delivered.
    pub fn release_acks(&self) -> usize {
        let withheld = std::mem::take(
            &mut *self
                .net
                .withheld
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let mut delivered = 0;
        for (sender, id) in withheld {
            if self.net.ack(&sender, &id) {
                delivered += 1;
            }
        }
        delivered
    }
}

impl Network {
    /// Clone the consumer out so no map guard is held during the callback.
    fn consumer(&self, addr: &str) -> Option<Arc<dyn MessageConsumer>> {
        self.mailboxes.get(addr).map(|m| m.consumer.clone())
    }

    fn deliver(
        &self,
        from: PublicKey,
        recipient: &str,
        provider: &str,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let to = address(recipient, provider);
        let consumer = self
            .consumer(&to)
            .ok_or_else(|| TransportError::Unreachable(to.clone()))?;
        consumer.received_message(Some(from), payload);
        Ok(())
    }

    fn ack(&self, sender: &str, id: &MessageId) -> bool {
        match self.consumer(sender) {
            Some(consumer) => {
                consumer.received_ack(id, b"");
                true
            }
            None => false,
        }
    }
}

impl Transport for LoopbackNetwork {
    fn new_session(&self, params: SessionParams) -> Result<Arc<dyn TransportSession>, TransportError> {
        let addr = address(&params.user, &params.provider);
        let identity = params.identity_key.public();
        match self.net.mailboxes.entry(addr.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(TransportError::Rejected(format!("{addr} already connected")));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Mailbox {
                    user: params.user.clone(),
                    identity,
                    consumer: params.consumer,
                });
            }
        }
        tracing::debug!(address = %addr, "loopback mailbox registered");
        Ok(Arc::new(LoopbackSession {
            net: self.net.clone(),
            address: addr,
            identity,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Resolves `user@provider` or a bare `user` to the identity key its
/// session connected with.
impl KeyDirectory for LoopbackNetwork {
    fn lookup(&self, identity: &str) -> Option<PublicKey> {
        if let Some(m) = self.net.mailboxes.get(identity) {
            return Some(m.identity);
        }
        self.net
            .mailboxes
            .iter()
            .find(|m| m.value().user == identity)
            .map(|m| m.value().identity)
    }
}

struct LoopbackSession {
    net: Arc<Network>,
    address: String,
    identity: PublicKey,
    closed: AtomicBool,
}

impl LoopbackSession {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

impl TransportSession for LoopbackSession {
    fn send(
        &self,
        id: &MessageId,
        recipient: &str,
        provider: &str,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.net.deliver(self.identity, recipient, provider, payload)?;
        if self.net.withhold_acks.load(Ordering::Relaxed) {
            self.net
                .withheld
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((self.address.clone(), *id));
        } else {
            self.net.ack(&self.address, id);
        }
        Ok(())
    }

    fn send_unreliable(
        &self,
        recipient: &str,
        provider: &str,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.net.deliver(self.identity, recipient, provider, payload)
    }

    fn shutdown(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(TransportError::Closed);
        }
        self.net.mailboxes.remove(&self.address);
        tracing::debug!(address = %self.address, "loopback mailbox removed");
        Ok(())
    }
}
