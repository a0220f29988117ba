//! External collaborators consumed by the quota engine.
//!
//! The block store, the user directory and the mutable-pointer service are
//! reached only through these traits. All calls are async and may fail with
//! `StorageUnavailable`.
//!
//! # Modules
//!
//! - [`writer_data`]: decodes the owned-keys field of a writer's root record.
//! - [`memory`]: in-memory backends for tests, benchmarks and fixtures.

pub mod memory;
pub mod writer_data;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::hash::{ContentHash, MaybeHash};
use crate::identity::WriterIdentity;

pub use memory::{MemoryBlockStore, MemoryDirectory, MemoryPointers};
pub use writer_data::{WriterData, WriterDataReader};

/// Read access to the content-addressed block store.
#[async_trait]
pub trait ContentAddressedStorage: Send + Sync {
    /// Fetch the serialized object stored under `hash`.
    async fn get(&self, hash: &ContentHash) -> Result<Option<Vec<u8>>>;

    /// Ordered child hashes of the block.
    async fn get_links(&self, hash: &ContentHash) -> Result<Vec<ContentHash>>;

    /// Own byte size of the block, excluding children.
    async fn get_size(&self, hash: &ContentHash) -> Result<Option<u64>>;
}

/// Username → root identity registry.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_usernames(&self, prefix: &str) -> Result<Vec<String>>;

    async fn root_identity(&self, username: &str) -> Result<Option<WriterIdentity>>;
}

/// Identity → current signed root.
#[async_trait]
pub trait MutablePointers: Send + Sync {
    async fn current_root(&self, writer: &WriterIdentity) -> Result<MaybeHash>;
}

/// Reads the set of identities a writer owns from the record at its root.
#[async_trait]
pub trait OwnedKeysReader: Send + Sync {
    async fn owned_keys(
        &self,
        writer: &WriterIdentity,
        root: &ContentHash,
    ) -> Result<BTreeSet<WriterIdentity>>;
}
