// Billing crate clippy configuration
#![allow(clippy::too_many_arguments)] // Some Stripe operations require many parameters
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Botfleet Billing Module
//!
//! Handles Stripe integration for company subscriptions and add-on content
//! billing.
//!
//! ## Features
//!
//! - **Registration Checkout**: Checkout sessions with trial for new companies
//! - **Content Modules**: Enable/disable add-on content modules per company
//! - **Reconciliation**: Keep the Stripe add-on quantity equal to the
//!   billable content count (first module free)
//! - **Subscription Sync**: Mirror Stripe subscription state into Postgres
//! - **Webhooks**: Verified, idempotent Stripe event handling
//! - **Invariants**: Runnable consistency checks over billing state

pub mod checkout;
pub mod client;
pub mod contents;
pub mod customer;
pub mod error;
pub mod events;
pub mod invariants;
pub mod reconcile;
pub mod subscriptions;
pub mod webhooks;

// Checkout
pub use checkout::{CheckoutResponse, CheckoutService};

// Client
pub use client::{StripeClient, StripeConfig};

// Contents
pub use contents::{CompanyContent, ContentService};

// Customer
pub use customer::CustomerService;

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{BillingEventLogger, BillingEventType};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Reconcile
pub use reconcile::{
    billable_quantity, is_addon_item, ReconcileAction, ReconcileReport, ReconciliationService,
};

// Subscriptions
pub use subscriptions::{SubscriptionService, TrialEndingCompany};

// Webhooks
pub use webhooks::WebhookHandler;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub contents: ContentService,
    pub customer: CustomerService,
    pub invariants: InvariantChecker,
    pub reconcile: ReconciliationService,
    pub subscriptions: SubscriptionService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        Ok(Self::with_client(stripe, pool))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        Self::with_client(StripeClient::new(config), pool)
    }

    fn with_client(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            checkout: CheckoutService::new(stripe.clone()),
            contents: ContentService::new(pool.clone()),
            customer: CustomerService::new(stripe.clone(), pool.clone()),
            invariants: InvariantChecker::new(pool.clone()),
            reconcile: ReconciliationService::new(stripe.clone(), pool.clone()),
            subscriptions: SubscriptionService::new(stripe.clone(), pool.clone()),
            webhooks: WebhookHandler::new(stripe, pool),
        }
    }
}
