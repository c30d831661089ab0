//! Core of Compliance Vault Pro.
//!
//! Holds the order fulfilment state machine and the services built around
//! it: document generation and delivery handlers, SLA tracking, background
//! jobs, the ClearForm credit ledger, consent handling, organizations,
//! compliance scoring and payment webhook dispatch. [`VaultBuilder`] wires
//! them into a [`VaultEngine`] from configured factories.

pub mod builder;
pub mod clearform;
pub mod compliance;
pub mod consent;
pub mod credits;
pub mod engine;
pub mod handlers;
pub mod jobs;
pub mod organizations;
pub mod sla;
pub mod state;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{BuilderError, VaultBuilder, VaultFactories};
pub use clearform::{ClearFormError, ClearFormService};
pub use compliance::ComplianceService;
pub use consent::{ConsentError, ConsentService};
pub use credits::{CreditError, CreditLedger};
pub use engine::{EngineError, VaultEngine};
pub use handlers::{HandlerError, OrderActions};
pub use organizations::{OrganizationError, OrganizationService};
pub use state::{OrderStateError, OrderStateMachine};
pub use webhooks::{WebhookDispatcher, WebhookError, WebhookOutcome};
