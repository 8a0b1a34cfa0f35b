//! Content-addressed blob storage.
//!
//! The blob layer offers no confidentiality: everything put here is either
//! segment ciphertext or a plaintext init segment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use segvault_core::BlobId;

use crate::error::{Result, StoreError};

/// Compute the content address of a blob.
pub fn blob_id_for(bytes: &[u8]) -> Result<BlobId> {
    Ok(BlobId::new(blake3::hash(bytes).to_hex().to_string())?)
}

/// Store and retrieve opaque byte buffers by content address.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes, returning their content address. Idempotent.
    async fn put(&self, bytes: Bytes) -> Result<BlobId>;

    async fn get(&self, id: &BlobId) -> Result<Option<Bytes>>;
}

/// In-memory blob store for tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace a blob's bytes in place. Used to simulate storage tampering.
    pub fn overwrite(&self, id: &BlobId, bytes: Bytes) {
        if let Ok(mut blobs) = self.blobs.write() {
            blobs.insert(id.clone(), bytes);
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Bytes) -> Result<BlobId> {
        let id = blob_id_for(&bytes)?;
        let mut blobs = self
            .blobs
            .write()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {e}")))?;
        blobs.entry(id.clone()).or_insert(bytes);
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> Result<Option<Bytes>> {
        let blobs = self
            .blobs
            .read()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {e}")))?;
        Ok(blobs.get(id).cloned())
    }
}

/// Filesystem blob store: one file per blob under a root directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (creating if needed) a blob directory.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, id: &BlobId) -> Result<PathBuf> {
        let name = id.as_str();
        if name.len() != 64 || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidData(format!("not a blob id: {name}")));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, bytes: Bytes) -> Result<BlobId> {
        let id = blob_id_for(&bytes)?;
        let path = self.path_for(&id)?;
        if tokio::fs::try_exists(&path).await? {
            return Ok(id);
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(id)
    }

    async fn get(&self, id: &BlobId) -> Result<Option<Bytes>> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
