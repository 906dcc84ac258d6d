// API crate clippy configuration
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Botfleet API Library
//!
//! The HTTP server for the Botfleet administration backend: company
//! registration and CRUD, LINE webhook handling, bot provisioning, and the
//! billing surface.

pub mod config;
pub mod error;
pub mod line;
pub mod provisioning;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
