//! Application state

use std::sync::Arc;

use reqwest::Client;
use sqlx::PgPool;

use botfleet_billing::BillingService;

use crate::{
    config::Config,
    error::ApiError,
    line::{LineClient, UserStateStore},
    provisioning::Provisioner,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    /// Billing service; None when Stripe is not configured
    pub billing: Option<Arc<BillingService>>,
    pub http_client: Client,
    pub line: LineClient,
    pub user_states: UserStateStore,
    pub provisioner: Arc<Provisioner>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        // Stripe is optional so the admin surface keeps working in
        // environments without billing credentials
        let billing = match BillingService::from_env(pool.clone()) {
            Ok(svc) => {
                tracing::info!("Stripe billing service initialized");
                Some(Arc::new(svc))
            }
            Err(e) => {
                tracing::warn!("Stripe billing not configured: {}", e);
                None
            }
        };

        let http_client = Client::new();
        let line = LineClient::new(http_client.clone());
        let user_states = UserStateStore::new(pool.clone());

        let provisioner = Arc::new(Provisioner::from_config(&config, http_client.clone()));
        tracing::info!(
            strategies = ?provisioner.strategy_names(),
            "Provisioning chain initialized"
        );

        Self {
            pool,
            config,
            billing,
            http_client,
            line,
            user_states,
            provisioner,
        }
    }

    /// Billing service or a 503 for routes that need Stripe.
    pub fn billing(&self) -> Result<&Arc<BillingService>, ApiError> {
        self.billing.as_ref().ok_or(ApiError::BillingUnavailable)
    }
}
