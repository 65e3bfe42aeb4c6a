use crate::*;

use mixlink_core::EncodingError;
use mixlink_session::{Delivery, SessionError, SessionState, TransportError};

/// Past capacity, new arrivals are dropped and counted; what was already
/// queued is untouched.
#[tokio::test]
async fn test_ingress_overflow_drops_newest() -> Result<()> {
    let (_network, alice, bob) = pair()?;

    for n in 0..105u8 {
        alice.send_unreliable("bob", PROVIDER, &[n])?;
    }
    let stats = bob.stats();
    assert_eq!(stats.queued, 100);
    assert_eq!(stats.dropped, 5);

    for n in 0..100u8 {
        assert_eq!(recv(&bob).await?.payload[0], n);
    }
    assert!(bob.try_get_message()?.is_none());
    Ok(())
}

/// A receiver blocked on an empty queue is released by shutdown.
#[tokio::test]
async fn test_shutdown_unblocks_waiting_receiver() -> Result<()> {
    let network = LoopbackNetwork::new();
    let bob = connected(&network, "bob")?;

    let waiter = {
        let bob = bob.clone();
        tokio::spawn(async move { bob.get_message().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    bob.shutdown();

    let result = tokio::time::timeout(WAIT, waiter).await??;
    assert!(matches!(result, Err(SessionError::SessionClosed)));
    Ok(())
}

/// Unacknowledged sends are abandoned at shutdown and their receipts say so.
#[tokio::test]
async fn test_shutdown_abandons_pending() -> Result<()> {
    let (network, alice, _bob) = pair()?;
    network.set_withhold_acks(true);

    let first = alice.send("bob", PROVIDER, b"one")?;
    let second = alice.send("bob", PROVIDER, b"two")?;
    assert_eq!(alice.stats().pending, 2);

    alice.shutdown();
    assert!(matches!(first.delivered().await, Delivery::Abandoned { .. }));
    assert!(matches!(second.delivered().await, Delivery::Abandoned { .. }));
    assert_eq!(alice.stats().pending, 0);

    // Acks that show up afterwards have nowhere to go.
    assert_eq!(network.release_acks(), 0);
    Ok(())
}

/// Queued messages are discarded at shutdown; nothing can be read afterwards.
#[tokio::test]
async fn test_queued_messages_discarded_on_shutdown() -> Result<()> {
    let (_network, alice, bob) = pair()?;
    alice.send("bob", PROVIDER, b"never read")?;
    assert_eq!(bob.stats().queued, 1);

    bob.shutdown();
    assert_eq!(bob.stats().queued, 0);
    assert!(matches!(bob.get_message().await, Err(SessionError::SessionClosed)));
    assert!(matches!(bob.try_get_message(), Err(SessionError::SessionClosed)));
    Ok(())
}

/// Every operation on a shut-down session reports it closed.
#[tokio::test]
async fn test_operations_after_shutdown() -> Result<()> {
    let (_network, alice, _bob) = pair()?;
    alice.shutdown();

    assert!(matches!(
        alice.send("bob", PROVIDER, b"late"),
        Err(SessionError::SessionClosed)
    ));
    assert!(matches!(
        alice.send_unreliable("bob", PROVIDER, b"late"),
        Err(SessionError::SessionClosed)
    ));
    assert!(matches!(
        alice.connect(Arc::new(Keypair::generate())),
        Err(SessionError::SessionClosed)
    ));
    assert_eq!(alice.state(), SessionState::ShutDown);
    Ok(())
}

/// A send the transport refuses leaves no pending entry behind.
#[test]
fn test_unreachable_recipient() -> Result<()> {
    let network = LoopbackNetwork::new();
    let alice = connected(&network, "alice")?;

    let err = alice.send("nobody", PROVIDER, b"hello?").unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::Unreachable(ref addr)) if addr == "nobody@acme"
    ));
    assert_eq!(alice.stats().pending, 0);

    assert!(matches!(
        alice.send_unreliable("nobody", PROVIDER, b"hello?"),
        Err(SessionError::Transport(TransportError::Unreachable(_)))
    ));
    Ok(())
}

#[test]
fn test_unknown_identity() -> Result<()> {
    let (_network, alice, _bob) = pair()?;
    let err = alice.resolve("unknown-user").unwrap_err();
    assert!(matches!(err, SessionError::UnknownIdentity(ref who) if who == "unknown-user"));
    Ok(())
}

/// Empty and oversized payloads are rejected before reaching the network.
#[test]
fn test_payload_encoding_errors() -> Result<()> {
    let network = LoopbackNetwork::new();
    let alice = session_with(
        &network,
        SessionConfig::new("alice", PROVIDER).with_max_payload_len(64),
    );
    alice.connect(Arc::new(Keypair::generate()))?;
    let bob = connected(&network, "bob")?;

    assert!(matches!(
        alice.send("bob", PROVIDER, b""),
        Err(SessionError::Encoding(EncodingError::Empty))
    ));
    assert!(matches!(
        alice.send("bob", PROVIDER, &[0u8; 65]),
        Err(SessionError::Encoding(EncodingError::TooLarge { len: 65, max: 64 }))
    ));
    assert!(matches!(
        alice.send_unreliable("bob", PROVIDER, &[0u8; 65]),
        Err(SessionError::Encoding(EncodingError::TooLarge { .. }))
    ));

    assert_eq!(alice.stats().pending, 0);
    assert_eq!(bob.stats().queued, 0);

    // Exactly at the limit is fine.
    let mut receipt = alice.send("bob", PROVIDER, &[7u8; 64])?;
    assert!(matches!(receipt.try_delivered(), Some(Delivery::Acked { .. })));
    assert_eq!(bob.stats().queued, 1);
    Ok(())
}
