use crate::*;

use std::collections::HashSet;

use mixlink_session::{Delivery, DeliveryStatus, MessageConsumer};

/// Reliable send: message arrives at bob, alice's receipt resolves as acked.
#[tokio::test]
async fn test_reliable_send_is_received_and_acked() -> Result<()> {
    let (_network, alice, bob) = pair()?;

    let receipt = alice.send("bob", PROVIDER, b"hello bob")?;
    let id = receipt.id();

    let message = recv(&bob).await?;
    assert_eq!(&message.payload[..], b"hello bob");
    assert_eq!(message.sender, Some(bob.resolve("alice")?));

    let delivery = tokio::time::timeout(WAIT, receipt.delivered()).await?;
    assert!(matches!(delivery, Delivery::Acked { id: acked, .. } if acked == id));
    assert_eq!(alice.delivery_status(&id), None);
    assert_eq!(alice.stats().acked, 1);
    assert_eq!(alice.stats().pending, 0);
    Ok(())
}

/// An ack held back by the network leaves the entry awaiting; releasing it
/// settles the entry, and replaying the same ack changes nothing.
#[tokio::test]
async fn test_late_and_duplicate_acks() -> Result<()> {
    let (network, alice, bob) = pair()?;
    network.set_withhold_acks(true);

    let mut receipt = alice.send("bob", PROVIDER, b"slow ack")?;
    let id = receipt.id();
    recv(&bob).await?;

    assert_eq!(alice.delivery_status(&id), Some(DeliveryStatus::AwaitingAck));
    assert!(receipt.try_delivered().is_none());

    assert_eq!(network.release_acks(), 1);
    assert!(matches!(receipt.try_delivered(), Some(Delivery::Acked { .. })));
    assert_eq!(alice.delivery_status(&id), None);

    // Same ack delivered again, as a retransmitting network might.
    alice.dispatcher().received_ack(&id, b"");
    assert_eq!(alice.stats().acked, 1);
    Ok(())
}

/// Unreliable send delivers without ever creating a pending entry.
#[tokio::test]
async fn test_unreliable_send_is_untracked() -> Result<()> {
    let (_network, alice, bob) = pair()?;

    alice.send_unreliable("bob", PROVIDER, b"best effort")?;
    let message = recv(&bob).await?;
    assert_eq!(&message.payload[..], b"best effort");

    let stats = alice.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.acked, 0);
    Ok(())
}

/// Messages come out of the queue in the order they went in.
#[tokio::test]
async fn test_fifo_order() -> Result<()> {
    let (_network, alice, bob) = pair()?;

    for n in 0..20u8 {
        alice.send("bob", PROVIDER, &[n])?;
    }
    for n in 0..20u8 {
        assert_eq!(recv(&bob).await?.payload[0], n);
    }
    Ok(())
}

/// Many reliable sends get many distinct ids, all acked.
#[tokio::test]
async fn test_message_ids_unique_within_session() -> Result<()> {
    let (_network, alice, bob) = pair()?;

    let mut ids = HashSet::new();
    for _ in 0..50 {
        let receipt = alice.send("bob", PROVIDER, b"x")?;
        assert!(ids.insert(receipt.id()), "duplicate message id");
    }
    assert_eq!(alice.stats().acked, 50);
    for _ in 0..50 {
        recv(&bob).await?;
    }
    Ok(())
}

/// Concurrent receivers split the messages between them; none is seen twice.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_receivers_get_disjoint_messages() -> Result<()> {
    let network = LoopbackNetwork::new();
    let alice = connected(&network, "alice")?;
    let bob = session_with(
        &network,
        SessionConfig::new("bob", PROVIDER).with_ingress_capacity(1000),
    );
    bob.connect(Arc::new(Keypair::generate()))?;

    const TOTAL: u32 = 400;
    let mut workers = Vec::new();
    for _ in 0..4 {
        let bob = bob.clone();
        workers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Ok(message) = bob.get_message().await {
                seen.push(u32::from_be_bytes(message.payload[..4].try_into().unwrap()));
            }
            seen
        }));
    }

    for n in 0..TOTAL {
        alice.send("bob", PROVIDER, &n.to_be_bytes())?;
    }

    // Wait until everything is consumed, then close to release the workers.
    let deadline = tokio::time::Instant::now() + WAIT;
    while bob.stats().queued > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    bob.shutdown();

    let mut all = Vec::new();
    for worker in workers {
        all.extend(tokio::time::timeout(WAIT, worker).await??);
    }
    let unique: HashSet<u32> = all.iter().copied().collect();
    assert_eq!(all.len(), unique.len(), "a message was received twice");
    assert_eq!(unique.len(), TOTAL as usize);
    Ok(())
}

/// A session can message itself; the ack still correlates.
#[tokio::test]
async fn test_send_to_self() -> Result<()> {
    let network = LoopbackNetwork::new();
    let alice = connected(&network, "alice")?;

    let receipt = alice.send("alice", PROVIDER, b"note to self")?;
    assert_eq!(&recv(&alice).await?.payload[..], b"note to self");
    assert!(receipt.delivered().await.is_acked());
    Ok(())
}
