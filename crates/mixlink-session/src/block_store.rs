//! Block storage for transport-level retransmission.
//!
//! The transport fragments reliable messages into blocks and may ask for them
//! again to resend. The session only wires a [`BlockStore`] through to the
//! transport at connect time; it never reads or writes blocks itself.
//!
//! Two implementations:
//!   - [`StorageStub`]: the default. Every call fails with `NotImplemented`.
//!   - [`DiskBlockStore`]: blocks content-addressed by BLAKE3 under
//!     `{root}/{id[0..2]}/{id}/{block_hash}`, with a per-message `manifest`
//!     recording insertion order. Block files are immutable once written.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use memmap2::Mmap;
use mixlink_core::config::{StorageBackend, StorageConfig};
use mixlink_core::crypto::hash;
use mixlink_core::MessageId;

use crate::error::StorageError;

pub trait BlockStore: Send + Sync {
    /// All blocks stored for `id`, in the order they were put.
    fn get_blocks(&self, id: &MessageId) -> Result<Vec<Bytes>, StorageError>;

    /// Append a block for `id`. Putting the same block twice is a no-op.
    fn put_block(&self, id: &MessageId, block: &[u8]) -> Result<(), StorageError>;
}

/// Build the store selected in config.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn BlockStore>, StorageError> {
    match config.backend {
        StorageBackend::Stub => Ok(Arc::new(StorageStub)),
        StorageBackend::Disk => Ok(Arc::new(DiskBlockStore::new(&config.block_dir)?)),
    }
}

// ── Stub ──────────────────────────────────────────────────────────────────────

/// Placeholder store that refuses every operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageStub;

impl BlockStore for StorageStub {
    fn get_blocks(&self, _id: &MessageId) -> Result<Vec<Bytes>, StorageError> {
        Err(StorageError::NotImplemented("get_blocks"))
    }

    fn put_block(&self, _id: &MessageId, _block: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::NotImplemented("put_block"))
    }
}

// ── Disk ──────────────────────────────────────────────────────────────────────

const MANIFEST: &str = "manifest";

/// Content-addressed block store on local disk.
#[derive(Debug)]
pub struct DiskBlockStore {
    root: PathBuf,
    // Serializes manifest read-modify-append.
    write_lock: Mutex<()>,
}

impl DiskBlockStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            StorageError::io(format!("failed to create block root {}", root.display()), e)
        })?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Two-level: blocks/ab/ab12.../
    fn message_dir(&self, id: &MessageId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[0..2]).join(&hex)
    }

    fn read_manifest(dir: &Path) -> Result<Option<Vec<String>>, StorageError> {
        let path = dir.join(MANIFEST);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text.lines().map(str::to_string).collect())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(
                format!("failed to read manifest {}", path.display()),
                e,
            )),
        }
    }

    fn read_block(path: &Path) -> Result<Bytes, StorageError> {
        let file = fs::File::open(path)
            .map_err(|e| StorageError::io(format!("failed to open block {}", path.display()), e))?;
        let len = file
            .metadata()
            .map_err(|e| StorageError::io(format!("failed to stat block {}", path.display()), e))?
            .len();
        if len == 0 {
            return Ok(Bytes::new());
        }
        // Safety: file is opened read-only and block files are never rewritten
        let mmap = unsafe {
            Mmap::map(&file)
                .map_err(|e| StorageError::io(format!("failed to mmap block {}", path.display()), e))?
        };
        Ok(Bytes::copy_from_slice(&mmap))
    }

    /// Number of messages with at least one stored block.
    pub fn message_count(&self) -> usize {
        let mut total = 0;
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                if let Ok(subdir) = fs::read_dir(entry.path()) {
                    total += subdir.count();
                }
            }
        }
        total
    }

    /// Drop every block for `id`, e.g. once the message is acknowledged.
    pub fn remove(&self, id: &MessageId) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let dir = self.message_dir(id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(format!("failed to remove {}", dir.display()), e)),
        }
    }
}

impl BlockStore for DiskBlockStore {
    fn get_blocks(&self, id: &MessageId) -> Result<Vec<Bytes>, StorageError> {
        let dir = self.message_dir(id);
        let manifest = Self::read_manifest(&dir)?.ok_or(StorageError::NotFound(*id))?;
        manifest
            .iter()
            .map(|block_hash| Self::read_block(&dir.join(block_hash)))
            .collect()
    }

    fn put_block(&self, id: &MessageId, block: &[u8]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let dir = self.message_dir(id);
        let block_hash = hex::encode(hash(block));

        // Already recorded? Nothing to do.
        if let Some(manifest) = Self::read_manifest(&dir)? {
            if manifest.iter().any(|h| *h == block_hash) {
                return Ok(());
            }
        }

        fs::create_dir_all(&dir)
            .map_err(|e| StorageError::io(format!("failed to create {}", dir.display()), e))?;

        // Atomic write: tmp file → rename
        let path = dir.join(&block_hash);
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path).map_err(|e| {
                StorageError::io(format!("failed to create {}", tmp_path.display()), e)
            })?;
            file.write_all(block)
                .map_err(|e| StorageError::io("failed to write block data", e))?;
            file.sync_all()
                .map_err(|e| StorageError::io("failed to sync block to disk", e))?;
        }
        fs::rename(&tmp_path, &path).map_err(|e| {
            StorageError::io(
                format!("failed to rename {} to {}", tmp_path.display(), path.display()),
                e,
            )
        })?;

        let manifest_path = dir.join(MANIFEST);
        let mut manifest = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&manifest_path)
            .map_err(|e| {
                StorageError::io(format!("failed to open {}", manifest_path.display()), e)
            })?;
        writeln!(manifest, "{block_hash}")
            .and_then(|()| manifest.sync_all())
            .map_err(|e| StorageError::io("failed to append manifest", e))?;

        tracing::trace!(message_id = %id, block = &block_hash[..16], "block stored");
        Ok(())
    }
}
