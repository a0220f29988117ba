//! DAG diff engine: byte-size change between two Merkle-DAG roots.
//!
//! Only children that differ between the two roots are visited; subtrees
//! shared by both sides are never re-walked.

pub mod engine;

pub use engine::DagDiff;
