//! DagQuota: storage quota accounting for content-addressed DAGs.
//!
//! Tracks how many bytes each user's forest of writers references,
//! incrementally diffing every root change against the previous root,
//! and admits or rejects writes against per-user quotas. Usage survives
//! restarts through a versioned JSON snapshot.

pub mod backend;
pub mod config;
pub mod diff;
pub mod error;
pub mod filter;
pub mod forest;
pub mod hash;
pub mod identity;
pub mod ledger;
pub mod map;
pub mod storage;

// Re-export primary types
pub use config::QuotaConfig;
pub use error::{QuotaError, Result};
pub use filter::{Backends, ConfiguredQuota, QuotaFilter, QuotaPolicy, RegistrationEvent};
pub use hash::{ContentHash, MaybeHash};
pub use identity::{PointerUpdate, SignedRootUpdate, WriterIdentity};

// Re-export backend types
pub use backend::{
    ContentAddressedStorage, MemoryBlockStore, MemoryDirectory, MemoryPointers, MutablePointers,
    OwnedKeysReader, UserDirectory, WriterData, WriterDataReader,
};

// Re-export accounting types
pub use diff::DagDiff;
pub use forest::{OwnershipForest, StatView, WriterStat};
pub use ledger::{Usage, UsageLedger};
pub use storage::{SnapshotStore, UsageSnapshot};
