//! Content hashes and the optional DAG root.
//!
//! `ContentHash` identifies a block in the content-addressed store.
//! `MaybeHash` distinguishes "this writer never published a root" from
//! any present root, including the root of an empty object.

pub mod content;
pub mod maybe;

pub use content::ContentHash;
pub use maybe::MaybeHash;
