//! Stripe Checkout sessions for company registration

use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionSubscriptionData, CustomerId,
};

use crate::client::StripeClient;
use crate::error::BillingResult;

/// Checkout service for creating Stripe checkout sessions
pub struct CheckoutService {
    stripe: StripeClient,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Create the registration checkout session for a company.
    ///
    /// Subscription mode on the base plan with the configured trial period.
    /// Company name and email travel in the session metadata; the
    /// `checkout.session.completed` webhook uses them to upsert the company
    /// row, so registration stays idempotent even if the user retries
    /// checkout.
    pub async fn create_registration_checkout(
        &self,
        company_name: &str,
        email: &str,
        customer_id: &CustomerId,
    ) -> BillingResult<CheckoutSession> {
        let config = self.stripe.config();

        let success_url = format!(
            "{}/registration/success?session_id={{CHECKOUT_SESSION_ID}}",
            config.app_base_url
        );
        let cancel_url = format!("{}/registration/cancel", config.app_base_url);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("checkout_type".to_string(), "registration".to_string());
        metadata.insert("company_name".to_string(), company_name.to_string());
        metadata.insert("email".to_string(), email.to_string());

        let params = CreateCheckoutSession {
            customer: Some(customer_id.clone()),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(config.base_price_id.clone()),
                quantity: Some(1),
                ..Default::default()
            }]),
            subscription_data: Some(CreateCheckoutSessionSubscriptionData {
                trial_period_days: Some(config.trial_period_days),
                ..Default::default()
            }),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            email = %email,
            session_id = %session.id,
            trial_days = config.trial_period_days,
            "Created registration checkout session"
        );

        Ok(session)
    }

    /// Retrieve a checkout session by ID
    pub async fn get_session(&self, session_id: &str) -> BillingResult<CheckoutSession> {
        let session_id = session_id
            .parse::<stripe::CheckoutSessionId>()
            .map_err(|e| crate::error::BillingError::StripeApi(format!("Invalid session ID: {}", e)))?;

        let session = CheckoutSession::retrieve(self.stripe.inner(), &session_id, &[]).await?;
        Ok(session)
    }
}

/// Response for creating a checkout session
#[derive(Debug, serde::Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            session_id: session.id.to_string(),
            url: session.url,
        }
    }
}
