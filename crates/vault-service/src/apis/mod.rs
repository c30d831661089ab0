//! Request handling behind each HTTP route.
//!
//! Every module turns its domain errors into [`vault_types::APIError`] so the
//! router only deals with one error type.

pub mod clearform;
pub mod compliance;
pub mod credits;
pub mod orders;
pub mod webhooks;
