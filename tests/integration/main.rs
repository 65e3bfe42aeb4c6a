//! mixlink integration test harness.
//!
//! Tests in this crate drive real `Session`s end to end over the in-process
//! loopback transport. Nothing here needs a network, root, or a running
//! daemon; each test builds its own network and tears it down.
//!
//!   cargo test --test integration

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use mixlink_core::config::SessionConfig;
use mixlink_core::Keypair;
use mixlink_session::{Collaborators, InboundMessage, LoopbackNetwork, Session};

mod failures;
mod messaging;
mod storage;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const PROVIDER: &str = "acme";

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(2);

/// Build an unconnected session named `user@acme` on `network`.
pub fn session_on(network: &LoopbackNetwork, user: &str) -> Session {
    session_with(network, SessionConfig::new(user, PROVIDER))
}

pub fn session_with(network: &LoopbackNetwork, config: SessionConfig) -> Session {
    let collaborators =
        Collaborators::new(Arc::new(network.clone()), Arc::new(network.clone()));
    Session::new(config, collaborators)
}

/// Build and connect a session.
pub fn connected(network: &LoopbackNetwork, user: &str) -> Result<Session> {
    let session = session_on(network, user);
    session
        .connect(Arc::new(Keypair::generate()))
        .with_context(|| format!("connect {user}@{PROVIDER}"))?;
    Ok(session)
}

/// Two connected sessions, alice and bob, sharing one loopback network.
pub fn pair() -> Result<(LoopbackNetwork, Session, Session)> {
    let network = LoopbackNetwork::new();
    let alice = connected(&network, "alice")?;
    let bob = connected(&network, "bob")?;
    Ok((network, alice, bob))
}

/// Receive with a deadline so a broken test fails instead of hanging.
pub async fn recv(session: &Session) -> Result<InboundMessage> {
    let message = tokio::time::timeout(WAIT, session.get_message())
        .await
        .context("timed out waiting for message")??;
    Ok(message)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// The harness itself: two sessions come up and each can see the other's key.
#[test]
fn test_pair_connects_and_resolves() -> Result<()> {
    let (network, alice, bob) = pair()?;
    assert_eq!(network.registered(), 2);

    let bob_key = alice.resolve("bob")?;
    let alice_key = bob.resolve("alice@acme")?;
    assert_ne!(bob_key, alice_key);

    alice.shutdown();
    bob.shutdown();
    assert_eq!(network.registered(), 0);
    Ok(())
}
