//! Optional DAG root.

use serde::{Deserialize, Serialize};

use super::ContentHash;
use crate::error::{QuotaError, Result};

/// A writer's DAG root, absent until the writer first publishes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaybeHash(Option<ContentHash>);

impl MaybeHash {
    /// A present root.
    pub fn present(hash: ContentHash) -> Self {
        Self(Some(hash))
    }

    /// No root yet.
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }

    /// Return the hash, failing with `InvalidState` when absent.
    pub fn get(&self) -> Result<&ContentHash> {
        self.0
            .as_ref()
            .ok_or_else(|| QuotaError::InvalidState("hash not present".to_string()))
    }

    pub fn as_option(&self) -> Option<&ContentHash> {
        self.0.as_ref()
    }
}

impl From<ContentHash> for MaybeHash {
    fn from(hash: ContentHash) -> Self {
        Self::present(hash)
    }
}

impl From<Option<ContentHash>> for MaybeHash {
    fn from(hash: Option<ContentHash>) -> Self {
        Self(hash)
    }
}

impl std::fmt::Display for MaybeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(hash) => write!(f, "{hash}"),
            None => write!(f, "EMPTY"),
        }
    }
}
