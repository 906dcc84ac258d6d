//! Stripe client configuration

use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe webhook signing secret
    pub webhook_secret: String,
    /// Price ID for the base monthly plan every company subscribes to
    pub base_price_id: String,
    /// Price ID for the additional-content line item. Quantity on this item
    /// tracks the number of billable content modules.
    pub addon_price_id: String,
    /// Base URL for success/cancel redirects
    pub app_base_url: String,
    /// Trial length applied to new registrations
    pub trial_period_days: u32,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?,
            base_price_id: std::env::var("STRIPE_PRICE_BASE")
                .map_err(|_| BillingError::Config("STRIPE_PRICE_BASE not set".to_string()))?,
            addon_price_id: std::env::var("STRIPE_PRICE_ADDITIONAL_CONTENT").map_err(|_| {
                BillingError::Config("STRIPE_PRICE_ADDITIONAL_CONTENT not set".to_string())
            })?,
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            trial_period_days: std::env::var("STRIPE_TRIAL_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(14),
        })
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_required_env() {
        std::env::set_var("STRIPE_SECRET_KEY", "sk_test_123");
        std::env::set_var("STRIPE_WEBHOOK_SECRET", "whsec_test");
        std::env::set_var("STRIPE_PRICE_BASE", "price_base_123");
        std::env::set_var("STRIPE_PRICE_ADDITIONAL_CONTENT", "price_addon_123");
    }

    #[test]
    #[serial]
    fn trial_defaults_to_fourteen_days() {
        set_required_env();
        std::env::remove_var("STRIPE_TRIAL_DAYS");

        let config = StripeConfig::from_env().unwrap();
        assert_eq!(config.trial_period_days, 14);
        assert_eq!(config.addon_price_id, "price_addon_123");
    }

    #[test]
    #[serial]
    fn missing_secret_key_is_a_config_error() {
        set_required_env();
        std::env::remove_var("STRIPE_SECRET_KEY");

        match StripeConfig::from_env() {
            Err(BillingError::Config(msg)) => assert!(msg.contains("STRIPE_SECRET_KEY")),
            other => panic!("expected config error, got {:?}", other),
        }
    }
}
