//! In-memory backends.
//!
//! Blocks are addressed by SHA-256 of their payload followed by their link
//! digests, so identical blocks deduplicate exactly like a real store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use super::{ContentAddressedStorage, MutablePointers, UserDirectory};
use crate::error::{QuotaError, Result};
use crate::hash::{ContentHash, MaybeHash};
use crate::identity::WriterIdentity;

#[derive(Debug, Clone)]
struct Block {
    payload: Vec<u8>,
    links: Vec<ContentHash>,
}

/// In-memory content-addressed block store.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<ContentHash, Block>>,
    link_fetches: AtomicU64,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a block and return its hash. Re-putting identical content is a no-op.
    pub fn put_block(&self, payload: Vec<u8>, links: Vec<ContentHash>) -> ContentHash {
        let mut hasher = Sha256::new();
        hasher.update(&payload);
        for link in &links {
            hasher.update(link.as_bytes());
        }
        let hash = ContentHash::from_bytes(hasher.finalize().into());
        self.blocks
            .write()
            .entry(hash)
            .or_insert(Block { payload, links });
        hash
    }

    /// Drop a block, simulating garbage collection or a lost replica.
    pub fn remove_block(&self, hash: &ContentHash) -> bool {
        self.blocks.write().remove(hash).is_some()
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.blocks.read().contains_key(hash)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    /// Number of `get_links` calls served so far.
    pub fn link_fetches(&self) -> u64 {
        self.link_fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ContentAddressedStorage for MemoryBlockStore {
    async fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>> {
        Ok(self.blocks.read().get(hash).map(|b| b.payload.clone()))
    }

    async fn get_links(&self, hash: &ContentHash) -> Result<Vec<ContentHash>> {
        self.link_fetches.fetch_add(1, Ordering::Relaxed);
        self.blocks
            .read()
            .get(hash)
            .map(|b| b.links.clone())
            .ok_or_else(|| QuotaError::StorageUnavailable(format!("block {hash} not found")))
    }

    async fn get_size(&self, hash: &ContentHash) -> Result<Option<u64>> {
        Ok(self.blocks.read().get(hash).map(|b| b.payload.len() as u64))
    }
}

/// In-memory mutable-pointer service.
#[derive(Default)]
pub struct MemoryPointers {
    roots: RwLock<HashMap<WriterIdentity, ContentHash>>,
}

impl MemoryPointers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `writer` at `root`; an absent root clears the pointer.
    pub fn set_root(&self, writer: &WriterIdentity, root: MaybeHash) {
        let mut roots = self.roots.write();
        match root.as_option() {
            Some(hash) => {
                roots.insert(writer.clone(), *hash);
            }
            None => {
                roots.remove(writer);
            }
        }
    }
}

#[async_trait]
impl MutablePointers for MemoryPointers {
    async fn current_root(&self, writer: &WriterIdentity) -> Result<MaybeHash> {
        Ok(self.roots.read().get(writer).copied().into())
    }
}

/// In-memory user directory.
#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<BTreeMap<String, WriterIdentity>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, username: impl Into<String>, identity: WriterIdentity) {
        self.users.write().insert(username.into(), identity);
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn list_usernames(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .users
            .read()
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn root_identity(&self, username: &str) -> Result<Option<WriterIdentity>> {
        Ok(self.users.read().get(username).cloned())
    }
}
