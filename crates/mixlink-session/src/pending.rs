//! Pending-acknowledgment table: reliable sends waiting for their provider ACK.
//!
//! Each entry carries a oneshot sender. When the ACK arrives the entry moves
//! to `Acked`, leaves the table, and the original caller's
//! [`DeliveryReceipt`] resolves. Shutdown moves every remaining entry to
//! `Abandoned` and resolves their receipts the same way.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use mixlink_core::MessageId;
use serde::Serialize;
use tokio::sync::oneshot;

/// Lifecycle of a pending send.
///
/// Entries leave the table the moment they settle, so
/// `Session::delivery_status` only ever reports `AwaitingAck`; `Acked` and
/// `Abandoned` are the statuses carried by the settled entry itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    AwaitingAck,
    Acked,
    Abandoned,
}

/// Final outcome of a reliable send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Acked {
        id: MessageId,
        /// Bytes the provider attached to the acknowledgment.
        reply: Bytes,
        /// Time from send to acknowledgment.
        latency: Duration,
    },
    /// The session shut down before an acknowledgment arrived.
    Abandoned { id: MessageId },
}

impl Delivery {
    pub fn id(&self) -> MessageId {
        match self {
            Delivery::Acked { id, .. } | Delivery::Abandoned { id } => *id,
        }
    }

    pub fn is_acked(&self) -> bool {
        matches!(self, Delivery::Acked { .. })
    }
}

/// Handle returned by a reliable send.
#[derive(Debug)]
pub struct DeliveryReceipt {
    id: MessageId,
    rx: oneshot::Receiver<Delivery>,
}

impl DeliveryReceipt {
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Wait until the message is acknowledged or abandoned.
    pub async fn delivered(self) -> Delivery {
        let id = self.id;
        self.rx.await.unwrap_or(Delivery::Abandoned { id })
    }

    /// Non-blocking check. `None` while still awaiting acknowledgment.
    pub fn try_delivered(&mut self) -> Option<Delivery> {
        match self.rx.try_recv() {
            Ok(delivery) => Some(delivery),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Delivery::Abandoned { id: self.id }),
        }
    }
}

/// One outstanding reliable send.
#[derive(Debug)]
pub struct PendingSend {
    pub id: MessageId,
    pub recipient: String,
    pub provider: String,
    pub payload: Bytes,
    pub sent_at: Instant,
    pub status: DeliveryStatus,
    notify: Option<oneshot::Sender<Delivery>>,
}

impl PendingSend {
    /// Create an entry awaiting acknowledgment and the receipt that observes it.
    pub fn new(
        id: MessageId,
        recipient: &str,
        provider: &str,
        payload: Bytes,
    ) -> (Self, DeliveryReceipt) {
        let (tx, rx) = oneshot::channel();
        let entry = Self {
            id,
            recipient: recipient.to_string(),
            provider: provider.to_string(),
            payload,
            sent_at: Instant::now(),
            status: DeliveryStatus::AwaitingAck,
            notify: Some(tx),
        };
        (entry, DeliveryReceipt { id, rx })
    }

    fn settle(&mut self, delivery: Delivery) {
        self.status = match delivery {
            Delivery::Acked { .. } => DeliveryStatus::Acked,
            Delivery::Abandoned { .. } => DeliveryStatus::Abandoned,
        };
        if let Some(tx) = self.notify.take() {
            // Receiver may already be gone; the caller stopped caring.
            let _ = tx.send(delivery);
        }
    }
}

/// MessageId → PendingSend. Owned by the session state under its lock.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<MessageId, PendingSend>,
    acked: u64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entry. Returns it back if the id is already pending.
    pub fn insert(&mut self, entry: PendingSend) -> Result<(), PendingSend> {
        if self.entries.contains_key(&entry.id) {
            return Err(entry);
        }
        self.entries.insert(entry.id, entry);
        Ok(())
    }

    /// Match an acknowledgment. Returns the settled entry, or `None` if the id
    /// is unknown or already settled.
    pub fn acknowledge(&mut self, id: &MessageId, reply: &[u8]) -> Option<PendingSend> {
        let mut entry = self.entries.remove(id)?;
        let latency = entry.sent_at.elapsed();
        entry.settle(Delivery::Acked {
            id: *id,
            reply: Bytes::copy_from_slice(reply),
            latency,
        });
        self.acked += 1;
        Some(entry)
    }

    /// Remove an entry whose send never reached the transport.
    /// Its receipt was never handed out, so nobody is notified.
    pub fn rollback(&mut self, id: &MessageId) -> Option<PendingSend> {
        self.entries.remove(id)
    }

    /// Settle every remaining entry as abandoned. Returns how many there were.
    pub fn abandon_all(&mut self) -> usize {
        let count = self.entries.len();
        for (id, mut entry) in self.entries.drain() {
            entry.settle(Delivery::Abandoned { id });
        }
        count
    }

    pub fn status(&self, id: &MessageId) -> Option<DeliveryStatus> {
        self.entries.get(id).map(|e| e.status)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Acknowledgments matched since creation.
    pub fn acked(&self) -> u64 {
        self.acked
    }
}
