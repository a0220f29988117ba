//! Signed compare-and-swap of a writer's root.
//!
//! The writer signs `cas:{writer}:{original}:{updated}` with its Ed25519 key.
//! Verification needs the writer's verifying key, which the caller looks up.

use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use super::WriterIdentity;
use crate::error::{QuotaError, Result};
use crate::hash::MaybeHash;

/// A decoded pointer update: the writer moved its root from `original` to `updated`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerUpdate {
    pub writer: WriterIdentity,
    pub original: MaybeHash,
    pub updated: MaybeHash,
}

/// A pointer update as published by the writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedRootUpdate {
    pub writer: WriterIdentity,
    pub original: MaybeHash,
    pub updated: MaybeHash,
    /// Base64 Ed25519 signature over the canonical message.
    pub signature: String,
}

impl SignedRootUpdate {
    /// Sign a root change with the writer's key.
    pub fn sign(
        signing_key: &SigningKey,
        writer: WriterIdentity,
        original: MaybeHash,
        updated: MaybeHash,
    ) -> Self {
        let message = canonical_message(&writer, &original, &updated);
        let signature = signing_key.sign(message.as_bytes());
        Self {
            writer,
            original,
            updated,
            signature: base64::engine::general_purpose::STANDARD.encode(signature.to_bytes()),
        }
    }

    /// Check the signature and return the decoded pair.
    pub fn verify(&self, verifying_key: &VerifyingKey) -> Result<PointerUpdate> {
        let sig_bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.signature)
            .map_err(|e| QuotaError::InvalidKey(format!("invalid base64 signature: {e}")))?;
        let sig_array: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| QuotaError::InvalidKey("signature must be 64 bytes".into()))?;
        let signature = Signature::from_bytes(&sig_array);

        let message = canonical_message(&self.writer, &self.original, &self.updated);
        verifying_key
            .verify(message.as_bytes(), &signature)
            .map_err(|_| QuotaError::SignatureInvalid)?;

        Ok(PointerUpdate {
            writer: self.writer.clone(),
            original: self.original,
            updated: self.updated,
        })
    }
}

fn canonical_message(writer: &WriterIdentity, original: &MaybeHash, updated: &MaybeHash) -> String {
    format!("cas:{writer}:{original}:{updated}")
}
