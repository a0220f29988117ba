//! Persistence for usage snapshots.
//!
//! # Modules
//!
//! - [`snapshot`]: versioned JSON snapshot of confirmed usage per user,
//!   plus the writer stats needed to resume incremental diffs.

pub mod snapshot;

pub use snapshot::{SnapshotStore, UsageSnapshot};
