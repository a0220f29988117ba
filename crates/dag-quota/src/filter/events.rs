//! Events pushed into the filter.

use serde::{Deserialize, Serialize};

use crate::identity::WriterIdentity;

/// A user registered or rotated its root identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationEvent {
    pub username: String,
    pub identity: WriterIdentity,
}

impl RegistrationEvent {
    pub fn new(username: impl Into<String>, identity: WriterIdentity) -> Self {
        Self {
            username: username.into(),
            identity,
        }
    }
}
