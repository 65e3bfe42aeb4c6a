//! Bounded FIFO of inbound messages.
//!
//! Overflow policy is drop-newest: when the queue is at capacity the arriving
//! message is discarded and counted, and everything already queued keeps its
//! place. The dispatcher logs each drop. Producers never wait on this queue.

use std::collections::VecDeque;

use bytes::Bytes;
use mixlink_core::PublicKey;

/// A received plaintext payload and its sender, if known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: Option<PublicKey>,
    pub payload: Bytes,
}

/// Result of offering a message to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// Queue was full; the offered message was discarded.
    Dropped,
    /// Queue is closed to producers.
    Closed,
}

#[derive(Debug)]
pub struct IngressQueue {
    items: VecDeque<InboundMessage>,
    capacity: usize,
    dropped: u64,
    closed: bool,
}

impl IngressQueue {
    /// Create a queue holding at most `capacity` messages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
            closed: false,
        }
    }

    pub fn push(&mut self, message: InboundMessage) -> Offer {
        if self.closed {
            return Offer::Closed;
        }
        if self.items.len() >= self.capacity {
            self.dropped += 1;
            return Offer::Dropped;
        }
        self.items.push_back(message);
        Offer::Queued
    }

    pub fn pop(&mut self) -> Option<InboundMessage> {
        self.items.pop_front()
    }

    /// Close to producers and discard anything still queued.
    /// Returns the number of discarded messages.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        let discarded = self.items.len();
        self.items.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Messages discarded on overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
