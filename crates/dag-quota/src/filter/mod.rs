//! Quota filter: event intake, admission control and lifecycle.
//!
//! The filter wires the diff engine, the ownership forest and the usage
//! ledger together behind the push interface the rest of the node uses.

pub mod engine;
pub mod events;
pub mod quota;

pub use engine::{Backends, QuotaFilter};
pub use events::RegistrationEvent;
pub use quota::{ConfiguredQuota, QuotaPolicy};
