//! Stripe webhook handling
//!
//! Verifies event signatures, claims each event id exactly once, and
//! dispatches to the subscription service. Duplicate or concurrent
//! deliveries of the same event are no-ops.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{Event, EventObject, EventType, Webhook};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::subscriptions::SubscriptionService;

type HmacSha256 = Hmac<Sha256>;

/// Events stuck in 'processing' longer than this can be re-claimed.
const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    stripe: StripeClient,
    pool: PgPool,
    subscriptions: SubscriptionService,
}

impl WebhookHandler {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let subscriptions = SubscriptionService::new(stripe.clone(), pool.clone());
        Self {
            stripe,
            pool,
            subscriptions,
        }
    }

    /// Verify and parse a Stripe webhook event.
    ///
    /// Tries the SDK verification first and falls back to manual signature
    /// verification, which keeps working when Stripe ships API versions the
    /// SDK's strict parser rejects.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<Event> {
        let webhook_secret = &self.stripe.config().webhook_secret;

        match Webhook::construct_event(payload, signature, webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::warn!(
                    stripe_error = %e,
                    "SDK webhook parsing failed, trying manual verification"
                );
            }
        }

        // Signature header format: t=timestamp,v1=signature[,v0=...]
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<String> = None;
        for part in signature.split(',') {
            if let Some((key, value)) = part.split_once('=') {
                match key {
                    "t" => timestamp = value.parse().ok(),
                    "v1" => v1_signature = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
        let v1_signature = v1_signature.ok_or(BillingError::WebhookSignatureInvalid)?;

        // Reject stale timestamps (5 minute tolerance)
        let now = OffsetDateTime::now_utc().unix_timestamp();
        if (now - timestamp).abs() > 300 {
            tracing::error!(
                timestamp = timestamp,
                now = now,
                "Webhook timestamp outside tolerance"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let secret_key = webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(webhook_secret);
        let signed_payload = format!("{}.{}", timestamp, payload);

        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .map_err(|_| BillingError::WebhookSignatureInvalid)?;
        mac.update(signed_payload.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            tracing::error!("Webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let event: Event = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::WebhookSignatureInvalid
        })?;

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Manual webhook verification succeeded"
        );

        Ok(event)
    }

    /// Handle a verified Stripe event.
    ///
    /// The INSERT .. ON CONFLICT .. RETURNING claim guarantees only one
    /// concurrent delivery processes the event; events stuck in 'processing'
    /// past the timeout can be re-claimed.
    pub async fn handle_event(&self, event: Event) -> BillingResult<()> {
        let event_id = event.id.to_string();
        let event_type_str = event.type_.to_string();
        let event_timestamp = OffsetDateTime::from_unix_timestamp(event.created)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());

        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO stripe_webhook_events
                (stripe_event_id, event_type, event_timestamp, processing_result, processing_started_at)
            VALUES ($1, $2, $3, 'processing', NOW())
            ON CONFLICT (stripe_event_id) DO UPDATE SET
                processing_result = 'processing',
                processing_started_at = NOW()
            WHERE stripe_webhook_events.processing_result = 'processing'
              AND stripe_webhook_events.processing_started_at < NOW() - ($4 || ' minutes')::INTERVAL
            RETURNING id
            "#,
        )
        .bind(&event_id)
        .bind(&event_type_str)
        .bind(event_timestamp)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_none() {
            tracing::info!(
                event_id = %event_id,
                event_type = %event_type_str,
                "Duplicate webhook event skipped"
            );
            return Ok(());
        }

        tracing::info!(
            event_type = %event_type_str,
            event_id = %event_id,
            "Processing Stripe webhook event"
        );

        let result = self.process_event(&event).await;

        let (processing_result, error_message) = match &result {
            Ok(()) => ("success", None),
            Err(e) => ("error", Some(e.to_string())),
        };

        if let Err(e) = sqlx::query(
            r#"
            UPDATE stripe_webhook_events
            SET processing_result = $1, error_message = $2
            WHERE stripe_event_id = $3
            "#,
        )
        .bind(processing_result)
        .bind(&error_message)
        .bind(&event_id)
        .execute(&self.pool)
        .await
        {
            tracing::error!(
                event_id = %event_id,
                error = %e,
                "Failed to record webhook processing result"
            );
        }

        result
    }

    async fn process_event(&self, event: &Event) -> BillingResult<()> {
        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                if let EventObject::CheckoutSession(session) = &event.data.object {
                    self.handle_checkout_completed(session).await?;
                }
            }
            EventType::CustomerSubscriptionCreated | EventType::CustomerSubscriptionUpdated => {
                if let EventObject::Subscription(subscription) = &event.data.object {
                    self.subscriptions.sync_subscription(subscription).await?;
                }
            }
            EventType::CustomerSubscriptionDeleted => {
                if let EventObject::Subscription(subscription) = &event.data.object {
                    self.subscriptions
                        .handle_cancellation(subscription, Some("stripe_subscription_deleted"))
                        .await?;
                }
            }
            EventType::InvoicePaid => {
                if let EventObject::Invoice(invoice) = &event.data.object {
                    let Some(customer_id) = invoice.customer.as_ref().map(|c| c.id()) else {
                        return Ok(());
                    };
                    let amount = invoice.amount_paid.unwrap_or(0);
                    let currency = invoice
                        .currency
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "jpy".to_string());
                    self.subscriptions
                        .record_invoice_paid(
                            invoice.id.as_str(),
                            customer_id.as_str(),
                            amount,
                            &currency,
                        )
                        .await?;
                }
            }
            EventType::InvoicePaymentFailed => {
                if let EventObject::Invoice(invoice) = &event.data.object {
                    let Some(customer_id) = invoice.customer.as_ref().map(|c| c.id()) else {
                        return Ok(());
                    };
                    self.subscriptions
                        .record_invoice_failed(invoice.id.as_str(), customer_id.as_str())
                        .await?;
                }
            }
            _ => {
                tracing::debug!(event_type = %event.type_, "Unhandled Stripe event type");
            }
        }

        Ok(())
    }

    /// Finalize a registration once checkout completes.
    ///
    /// The session metadata carries the company name and email from the
    /// registration route; the upsert makes redelivery and re-registration
    /// idempotent.
    async fn handle_checkout_completed(
        &self,
        session: &stripe::CheckoutSession,
    ) -> BillingResult<()> {
        let metadata = session.metadata.clone().unwrap_or_default();

        if metadata.get("checkout_type").map(String::as_str) != Some("registration") {
            tracing::debug!(
                session_id = %session.id,
                "Checkout completion without registration metadata, ignoring"
            );
            return Ok(());
        }

        let company_name = metadata
            .get("company_name")
            .ok_or_else(|| BillingError::Internal("checkout metadata missing company_name".into()))?;
        let email = metadata
            .get("email")
            .ok_or_else(|| BillingError::Internal("checkout metadata missing email".into()))?;

        let customer_id = session
            .customer
            .as_ref()
            .map(|c| c.id())
            .ok_or_else(|| BillingError::Internal("checkout session has no customer".into()))?;

        let subscription_id = session
            .subscription
            .as_ref()
            .map(|s| s.id())
            .ok_or_else(|| BillingError::Internal("checkout session has no subscription".into()))?;

        let subscription =
            stripe::Subscription::retrieve(self.stripe.inner(), &subscription_id, &[]).await?;

        let company_id = self
            .subscriptions
            .upsert_company_with_subscription(
                company_name,
                email,
                customer_id.as_str(),
                &subscription,
            )
            .await?;

        tracing::info!(
            company_id = %company_id,
            session_id = %session.id,
            "Registration checkout finalized"
        );

        Ok(())
    }
}
