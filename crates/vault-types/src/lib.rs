//! Common types module for Compliance Vault Pro.
//!
//! This module defines the document records and shared structures used
//! throughout the vault workspace: fulfilment orders and their version
//! histories, SLA clocks, ClearForm credits and documents, consent logs,
//! organizations and property compliance records.

/// API types for HTTP endpoints and error responses.
pub mod api;
/// ClearForm document records.
pub mod clearform;
/// Property requirements and compliance scoring records.
pub mod compliance;
/// Consent event log and per-client consent state.
pub mod consent;
/// ClearForm credit wallets and ledger entries.
pub mod credits;
/// Fulfilment order records, statuses and document versions.
pub mod order;
/// Organization and membership records.
pub mod organization;
/// Self-registration trait for pluggable implementations.
pub mod registry;
/// Secure wrapper for tokens and signing secrets.
pub mod secret_string;
/// Service level agreement clock embedded in orders.
pub mod sla;
/// Storage namespaces.
pub mod storage;
/// Formatting and time helpers.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use api::*;
pub use clearform::*;
pub use compliance::*;
pub use consent::*;
pub use credits::*;
pub use order::*;
pub use organization::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use sla::SlaTracking;
pub use storage::*;
pub use utils::{current_timestamp, render_template, truncate_id};
pub use validation::*;
