#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Botfleet shared crate
//!
//! Database pool construction, embedded migrations, and the domain types
//! shared between the API server, the billing crate, and the worker.

pub mod db;
pub mod types;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use types::{CompanyStatus, ContentType, DeploymentStatus, SubscriptionStatus};
