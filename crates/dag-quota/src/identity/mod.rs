//! Writer identities and signed root updates.
//!
//! A writer identity is derived from a public signing key and owns exactly
//! one current DAG root at a time. Root changes arrive as signed
//! compare-and-swap pairs.

pub mod signed;
pub mod writer;

pub use signed::{PointerUpdate, SignedRootUpdate};
pub use writer::WriterIdentity;
