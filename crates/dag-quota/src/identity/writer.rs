//! Writer identity.

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Opaque identifier of a public signing key.
///
/// Format: `wid_` + base58 of first 16 bytes of SHA-256(public_key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriterIdentity(pub String);

impl WriterIdentity {
    /// Wrap an already-derived identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Compute a writer identity from raw public key bytes.
    pub fn from_public_key(key: &[u8]) -> Self {
        let hash = Sha256::digest(key);
        let encoded = bs58::encode(&hash[..16]).into_string();
        Self(format!("wid_{encoded}"))
    }

    /// Compute a writer identity from an Ed25519 verifying key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self::from_public_key(key.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WriterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
