//! Ownership forest: every known writer, its root and the keys it owns.
//!
//! The forest provides:
//! - Lazy materialisation of writer stats on registration or discovery
//! - The pointer-update state machine (creation, update, retraction)
//! - Retraction cascading through owned keys
//! - Point-in-time views for snapshots and warm restart

pub mod stat;
pub mod tracker;

pub use stat::{StatState, StatView, WriterStat};
pub use tracker::OwnershipForest;
