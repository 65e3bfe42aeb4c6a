use crate::*;

use std::path::PathBuf;
use std::sync::Mutex;

use mixlink_core::config::{StorageBackend, StorageConfig};
use mixlink_core::MessageId;
use mixlink_session::{
    block_store, BlockStore, DiskBlockStore, SessionParams, StorageError, Transport,
    TransportError, TransportSession,
};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "mixlink-it-{}-{}",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Loopback transport that also keeps the block store handed over at connect.
struct CapturingTransport {
    inner: LoopbackNetwork,
    block_store: Mutex<Option<Arc<dyn BlockStore>>>,
}

impl Transport for CapturingTransport {
    fn new_session(
        &self,
        params: SessionParams,
    ) -> std::result::Result<Arc<dyn TransportSession>, TransportError> {
        *self.block_store.lock().unwrap() = Some(params.block_store.clone());
        self.inner.new_session(params)
    }
}

/// The configured block store reaches the transport at connect time.
#[test]
fn test_block_store_wired_to_transport() -> Result<()> {
    let network = LoopbackNetwork::new();
    let transport = Arc::new(CapturingTransport {
        inner: network.clone(),
        block_store: Mutex::new(None),
    });
    let disk = Arc::new(DiskBlockStore::new(scratch_dir("wired"))?);
    let collaborators = Collaborators::new(transport.clone(), Arc::new(network.clone()))
        .with_block_store(disk.clone());

    let alice = Session::new(SessionConfig::new("alice", PROVIDER), collaborators);
    alice.connect(Arc::new(Keypair::generate()))?;

    let handed_over = transport
        .block_store
        .lock()
        .unwrap()
        .clone()
        .context("transport never saw a block store")?;

    // Blocks the transport writes land in the session's store.
    let id = MessageId::generate();
    handed_over.put_block(&id, b"fragment-0")?;
    handed_over.put_block(&id, b"fragment-1")?;
    let blocks = disk.get_blocks(&id)?;
    assert_eq!(blocks.len(), 2);
    assert_eq!(&blocks[0][..], b"fragment-0");
    assert_eq!(&blocks[1][..], b"fragment-1");
    assert_eq!(disk.message_count(), 1);

    alice.shutdown();
    std::fs::remove_dir_all(disk.root())?;
    Ok(())
}

/// Without a configured store the transport gets the stub, which refuses
/// everything.
#[test]
fn test_default_store_is_stub() -> Result<()> {
    let store = block_store::from_config(&StorageConfig::default())?;
    let id = MessageId::generate();
    assert!(matches!(
        store.put_block(&id, b"x"),
        Err(StorageError::NotImplemented("put_block"))
    ));
    assert!(matches!(
        store.get_blocks(&id),
        Err(StorageError::NotImplemented("get_blocks"))
    ));
    Ok(())
}

#[test]
fn test_disk_backend_from_config() -> Result<()> {
    let config = StorageConfig {
        backend: StorageBackend::Disk,
        block_dir: scratch_dir("config"),
    };
    let store = block_store::from_config(&config)?;
    let id = MessageId::generate();

    assert!(matches!(store.get_blocks(&id), Err(StorageError::NotFound(missing)) if missing == id));
    store.put_block(&id, b"only block")?;
    assert_eq!(store.get_blocks(&id)?.len(), 1);
    assert!(config.block_dir.join(&id.to_hex()[..2]).is_dir());

    std::fs::remove_dir_all(&config.block_dir)?;
    Ok(())
}
