//! Subscription row management
//!
//! The database is the source of truth for what a company is entitled to;
//! Stripe is the payment processor. Everything that writes
//! `companies`/`company_monthly_subscriptions` from billing flows lives here
//! so there is exactly one writer to reason about.

use botfleet_shared::SubscriptionStatus;
use sqlx::PgPool;
use stripe::{Subscription, SubscriptionId};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::client::StripeClient;
use crate::events::{BillingEventLogger, BillingEventType};
use crate::error::BillingResult;

/// Map Stripe's subscription status onto the statuses we persist.
pub fn map_stripe_status(status: stripe::SubscriptionStatus) -> SubscriptionStatus {
    use stripe::SubscriptionStatus as S;
    match status {
        S::Trialing => SubscriptionStatus::Trialing,
        S::Active => SubscriptionStatus::Active,
        S::PastDue | S::Unpaid | S::Incomplete | S::Paused => SubscriptionStatus::PastDue,
        S::Canceled | S::IncompleteExpired => SubscriptionStatus::Canceled,
    }
}

fn period_bounds(sub: &Subscription) -> (Option<OffsetDateTime>, Option<OffsetDateTime>) {
    let start = OffsetDateTime::from_unix_timestamp(sub.current_period_start).ok();
    let end = OffsetDateTime::from_unix_timestamp(sub.current_period_end).ok();
    (start, end)
}

/// A company approaching the end of its trial
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrialEndingCompany {
    pub company_id: Uuid,
    pub name: String,
    pub email: String,
    pub trial_end: OffsetDateTime,
}

/// Subscription service
pub struct SubscriptionService {
    stripe: StripeClient,
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl SubscriptionService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self {
            stripe,
            pool,
            event_logger,
        }
    }

    /// Get the Stripe client for config access
    pub fn stripe(&self) -> &StripeClient {
        &self.stripe
    }

    /// Upsert the company row and its subscription link after a completed
    /// registration checkout.
    ///
    /// Idempotent at the companies-row level: the email is the conflict key,
    /// so re-registering an existing company updates the row instead of
    /// duplicating it. Returns the company id.
    pub async fn upsert_company_with_subscription(
        &self,
        company_name: &str,
        email: &str,
        customer_id: &str,
        subscription: &Subscription,
    ) -> BillingResult<Uuid> {
        let status = map_stripe_status(subscription.status);
        let (period_start, period_end) = period_bounds(subscription);

        let (company_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO companies (name, email, status, stripe_customer_id)
            VALUES ($1, $2, 'active', $3)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name,
                status = 'active',
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(company_name)
        .bind(email)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO company_monthly_subscriptions
                (company_id, stripe_subscription_id, status, current_period_start, current_period_end)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (company_id) DO UPDATE
            SET stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                updated_at = NOW()
            "#,
        )
        .bind(company_id)
        .bind(subscription.id.as_str())
        .bind(status.as_str())
        .bind(period_start)
        .bind(period_end)
        .execute(&self.pool)
        .await?;

        self.record_period(company_id, subscription.id.as_str(), period_start, period_end)
            .await?;

        self.event_logger
            .log(
                Some(company_id),
                BillingEventType::RegistrationCompleted,
                "stripe_webhook",
                serde_json::json!({
                    "email": email,
                    "subscription_id": subscription.id.as_str(),
                    "status": status.as_str(),
                }),
            )
            .await;

        tracing::info!(
            company_id = %company_id,
            email = %email,
            subscription_id = %subscription.id,
            status = %status,
            "Company registration persisted"
        );

        Ok(company_id)
    }

    /// Sync subscription status and period from a Stripe subscription object.
    /// Returns the company id, or None when the subscription is unknown to us.
    pub async fn sync_subscription(
        &self,
        subscription: &Subscription,
    ) -> BillingResult<Option<Uuid>> {
        let status = map_stripe_status(subscription.status);
        let (period_start, period_end) = period_bounds(subscription);

        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE company_monthly_subscriptions
            SET status = $2,
                current_period_start = $3,
                current_period_end = $4,
                updated_at = NOW()
            WHERE stripe_subscription_id = $1
            RETURNING company_id
            "#,
        )
        .bind(subscription.id.as_str())
        .bind(status.as_str())
        .bind(period_start)
        .bind(period_end)
        .fetch_optional(&self.pool)
        .await?;

        let Some((company_id,)) = row else {
            tracing::warn!(
                subscription_id = %subscription.id,
                "Subscription update for unknown subscription"
            );
            return Ok(None);
        };

        self.record_period(company_id, subscription.id.as_str(), period_start, period_end)
            .await?;

        self.event_logger
            .log(
                Some(company_id),
                BillingEventType::SubscriptionSynced,
                "stripe_webhook",
                serde_json::json!({
                    "subscription_id": subscription.id.as_str(),
                    "status": status.as_str(),
                }),
            )
            .await;

        Ok(Some(company_id))
    }

    /// Handle a deleted/canceled subscription: mark the row canceled, record
    /// cancellation history, and suspend the company.
    pub async fn handle_cancellation(
        &self,
        subscription: &Subscription,
        reason: Option<&str>,
    ) -> BillingResult<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE company_monthly_subscriptions
            SET status = 'canceled', updated_at = NOW()
            WHERE stripe_subscription_id = $1
            RETURNING company_id
            "#,
        )
        .bind(subscription.id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some((company_id,)) = row else {
            tracing::warn!(
                subscription_id = %subscription.id,
                "Cancellation for unknown subscription"
            );
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO cancellation_history (company_id, stripe_subscription_id, reason)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(company_id)
        .bind(subscription.id.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE companies SET status = 'suspended', updated_at = NOW() WHERE id = $1")
            .bind(company_id)
            .execute(&self.pool)
            .await?;

        self.event_logger
            .log(
                Some(company_id),
                BillingEventType::SubscriptionCanceled,
                "stripe_webhook",
                serde_json::json!({
                    "subscription_id": subscription.id.as_str(),
                    "reason": reason,
                }),
            )
            .await;

        tracing::info!(
            company_id = %company_id,
            subscription_id = %subscription.id,
            "Subscription canceled, company suspended"
        );

        Ok(Some(company_id))
    }

    /// Record a payment from a paid invoice. Idempotent on the invoice id.
    pub async fn record_invoice_paid(
        &self,
        invoice_id: &str,
        customer_id: &str,
        amount_cents: i64,
        currency: &str,
    ) -> BillingResult<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM companies WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((company_id,)) = row else {
            tracing::warn!(
                invoice_id = %invoice_id,
                customer_id = %customer_id,
                "Paid invoice for unknown customer"
            );
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO company_payments
                (company_id, stripe_invoice_id, amount_cents, currency, status, paid_at)
            VALUES ($1, $2, $3, $4, 'paid', NOW())
            ON CONFLICT (stripe_invoice_id) DO NOTHING
            "#,
        )
        .bind(company_id)
        .bind(invoice_id)
        .bind(amount_cents)
        .bind(currency)
        .execute(&self.pool)
        .await?;

        self.event_logger
            .log(
                Some(company_id),
                BillingEventType::InvoicePaid,
                "stripe_webhook",
                serde_json::json!({ "invoice_id": invoice_id, "amount_cents": amount_cents }),
            )
            .await;

        Ok(Some(company_id))
    }

    /// Record a failed invoice payment and mark the subscription past due.
    pub async fn record_invoice_failed(
        &self,
        invoice_id: &str,
        customer_id: &str,
    ) -> BillingResult<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM companies WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((company_id,)) = row else {
            tracing::warn!(
                invoice_id = %invoice_id,
                customer_id = %customer_id,
                "Failed invoice for unknown customer"
            );
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE company_monthly_subscriptions
            SET status = 'past_due', updated_at = NOW()
            WHERE company_id = $1 AND status IN ('trialing', 'active')
            "#,
        )
        .bind(company_id)
        .execute(&self.pool)
        .await?;

        self.event_logger
            .log(
                Some(company_id),
                BillingEventType::InvoicePaymentFailed,
                "stripe_webhook",
                serde_json::json!({ "invoice_id": invoice_id }),
            )
            .await;

        tracing::warn!(
            company_id = %company_id,
            invoice_id = %invoice_id,
            "Invoice payment failed, subscription marked past due"
        );

        Ok(Some(company_id))
    }

    /// Companies whose trial ends within the given number of days.
    pub async fn trial_ending_companies(
        &self,
        within_days: i64,
    ) -> BillingResult<Vec<TrialEndingCompany>> {
        let rows: Vec<TrialEndingCompany> = sqlx::query_as(
            r#"
            SELECT c.id AS company_id, c.name, c.email,
                   s.current_period_end AS trial_end
            FROM companies c
            JOIN company_monthly_subscriptions s ON s.company_id = c.id
            WHERE s.status = 'trialing'
              AND s.current_period_end IS NOT NULL
              AND s.current_period_end BETWEEN NOW() AND NOW() + ($1 || ' days')::INTERVAL
            ORDER BY s.current_period_end
            "#,
        )
        .bind(within_days)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Re-fetch subscription state from Stripe for rows that have not been
    /// touched recently and sync them. Returns the number synced.
    pub async fn sync_stale_subscriptions(&self, older_than_minutes: i64) -> BillingResult<usize> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT stripe_subscription_id
            FROM company_monthly_subscriptions
            WHERE status IN ('trialing', 'active', 'past_due')
              AND updated_at < NOW() - ($1 || ' minutes')::INTERVAL
            ORDER BY updated_at
            LIMIT 50
            "#,
        )
        .bind(older_than_minutes)
        .fetch_all(&self.pool)
        .await?;

        let mut synced = 0;
        for (sub_id_str,) in rows {
            let sub_id = match sub_id_str.parse::<SubscriptionId>() {
                Ok(id) => id,
                Err(e) => {
                    tracing::error!(
                        subscription_id = %sub_id_str,
                        error = %e,
                        "Stored subscription ID did not parse"
                    );
                    continue;
                }
            };

            match Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await {
                Ok(subscription) => {
                    if self.sync_subscription(&subscription).await?.is_some() {
                        synced += 1;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        subscription_id = %sub_id_str,
                        error = %e,
                        "Failed to retrieve subscription from Stripe"
                    );
                }
            }
        }

        Ok(synced)
    }

    async fn record_period(
        &self,
        company_id: Uuid,
        subscription_id: &str,
        period_start: Option<OffsetDateTime>,
        period_end: Option<OffsetDateTime>,
    ) -> BillingResult<()> {
        let (Some(start), Some(end)) = (period_start, period_end) else {
            return Ok(());
        };

        sqlx::query(
            r#"
            INSERT INTO subscription_periods
                (company_id, stripe_subscription_id, period_start, period_end)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (company_id, period_start) DO NOTHING
            "#,
        )
        .bind(company_id)
        .bind(subscription_id)
        .bind(start)
        .bind(end)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripe_statuses_map_onto_persisted_statuses() {
        use stripe::SubscriptionStatus as S;
        assert_eq!(map_stripe_status(S::Trialing), SubscriptionStatus::Trialing);
        assert_eq!(map_stripe_status(S::Active), SubscriptionStatus::Active);
        assert_eq!(map_stripe_status(S::PastDue), SubscriptionStatus::PastDue);
        assert_eq!(map_stripe_status(S::Unpaid), SubscriptionStatus::PastDue);
        assert_eq!(map_stripe_status(S::Canceled), SubscriptionStatus::Canceled);
        assert_eq!(
            map_stripe_status(S::IncompleteExpired),
            SubscriptionStatus::Canceled
        );
    }
}
