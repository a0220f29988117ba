//! Writer data record: the structural record at a writer's root.
//!
//! Only the `owned_keys` field matters for accounting; other fields are
//! ignored. Record format:
//! ```json
//! {
//!     "owned_keys": ["wid_...", "wid_..."],
//!     ...
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ContentAddressedStorage, OwnedKeysReader};
use crate::error::{QuotaError, Result};
use crate::hash::ContentHash;
use crate::identity::WriterIdentity;

/// Decoded writer data record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterData {
    #[serde(default)]
    pub owned_keys: BTreeSet<WriterIdentity>,
    /// Free-form content carried alongside the ownership edges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl WriterData {
    pub fn new(owned_keys: impl IntoIterator<Item = WriterIdentity>) -> Self {
        Self {
            owned_keys: owned_keys.into_iter().collect(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Serialize the record as stored in a root block.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| QuotaError::SerializationError(e.to_string()))
    }
}

/// `OwnedKeysReader` that decodes [`WriterData`] records from the block store.
pub struct WriterDataReader {
    storage: Arc<dyn ContentAddressedStorage>,
}

impl WriterDataReader {
    pub fn new(storage: Arc<dyn ContentAddressedStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl OwnedKeysReader for WriterDataReader {
    async fn owned_keys(
        &self,
        writer: &WriterIdentity,
        root: &ContentHash,
    ) -> Result<BTreeSet<WriterIdentity>> {
        let raw = self.storage.get(root).await?.ok_or_else(|| {
            QuotaError::StorageUnavailable(format!("writer data {root} for {writer} not found"))
        })?;

        let data: WriterData =
            serde_json::from_slice(&raw).map_err(|e| QuotaError::MalformedStructuralRecord {
                writer: writer.clone(),
                reason: e.to_string(),
            })?;

        Ok(data.owned_keys)
    }
}
