//! Add-on quantity reconciliation
//!
//! Keeps the quantity on a company's Stripe add-on subscription item equal to
//! the number of billable content modules in the database. The database count
//! is the source of truth; Stripe is mutated to match. The first active
//! module is included in the base plan, so `billable = active_count - 1`,
//! floored at zero.
//!
//! This service is the ONLY writer of the add-on subscription item. All
//! paths that change content state (API routes, the worker sweep) call into
//! here rather than touching Stripe themselves. Quantity is updated in
//! place; the item is never deleted and recreated, which would reset
//! Stripe's proration anchoring mid-period.
//!
//! Stripe and Postgres cannot share a transaction, so the Stripe mutation
//! happens first and the database write second. If the database write fails
//! the service compensates by restoring the previous Stripe state, and the
//! compensation itself is recorded in the billing event log.

use serde::Serialize;
use sqlx::PgPool;
// Import the proration behavior enum from the subscription module (not subscription_item)
use stripe::generated::billing::subscription::SubscriptionProrationBehavior;
use stripe::{Subscription, SubscriptionId, UpdateSubscription, UpdateSubscriptionItems};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventLogger, BillingEventType};

/// Billable quantity for a given number of active content modules.
/// The first module rides on the base plan for free.
pub fn billable_quantity(active_count: i64) -> u64 {
    active_count.saturating_sub(1).max(0) as u64
}

/// Whether a subscription item is the add-on line item.
///
/// The configured price id is authoritative; the nickname fallback catches
/// items created by hand in the Stripe dashboard before the price id was
/// pinned down ("additional", "metered", or the Japanese "追加").
pub fn is_addon_item(
    price_id: Option<&str>,
    nickname: Option<&str>,
    configured_price_id: &str,
) -> bool {
    if price_id == Some(configured_price_id) {
        return true;
    }
    match nickname {
        Some(nick) => {
            let lower = nick.to_lowercase();
            lower.contains("additional") || lower.contains("metered") || nick.contains("追加")
        }
        None => false,
    }
}

/// What reconciliation did for one company
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconcileAction {
    /// Stripe already matched the database
    NoChange,
    /// Add-on item created with the billable quantity
    ItemCreated { item_id: String },
    /// Quantity updated in place
    QuantityUpdated { from: u64, to: u64 },
    /// Billable count dropped to zero and the item was removed
    ItemRemoved { item_id: String },
    /// Company has no operational subscription to reconcile against
    SkippedNoSubscription,
    /// Reconciliation failed; see message (batch sweep only)
    Error { message: String },
}

/// Per-company reconciliation outcome
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub company_id: Uuid,
    pub active_contents: i64,
    pub billable_quantity: u64,
    #[serde(flatten)]
    pub action: ReconcileAction,
}

/// The add-on item as found on the Stripe subscription
#[derive(Debug, Clone)]
struct FoundAddonItem {
    id: String,
    quantity: u64,
}

/// Locate the add-on item among a subscription's line items.
fn find_addon_item(subscription: &Subscription, configured_price_id: &str) -> Option<FoundAddonItem> {
    subscription.items.data.iter().find_map(|item| {
        let price_id = item.price.as_ref().map(|p| p.id.to_string());
        let nickname = item.price.as_ref().and_then(|p| p.nickname.clone());
        if is_addon_item(price_id.as_deref(), nickname.as_deref(), configured_price_id) {
            Some(FoundAddonItem {
                id: item.id.to_string(),
                quantity: item.quantity.unwrap_or(0),
            })
        } else {
            None
        }
    })
}

/// The authoritative add-on quantity reconciliation service
pub struct ReconciliationService {
    stripe: StripeClient,
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl ReconciliationService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self {
            stripe,
            pool,
            event_logger,
        }
    }

    /// Reconcile a single company's add-on quantity against Stripe.
    pub async fn reconcile_company(&self, company_id: Uuid) -> BillingResult<ReconcileReport> {
        let sub_row: Option<(String, String)> = sqlx::query_as(
            r#"
            SELECT stripe_subscription_id, status
            FROM company_monthly_subscriptions
            WHERE company_id = $1
            "#,
        )
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;

        let active_contents = self.active_content_count(company_id).await?;
        let billable = billable_quantity(active_contents);

        let (subscription_id, status) = match sub_row {
            Some(row) => row,
            None => {
                return Ok(ReconcileReport {
                    company_id,
                    active_contents,
                    billable_quantity: billable,
                    action: ReconcileAction::SkippedNoSubscription,
                });
            }
        };

        let operational = botfleet_shared::SubscriptionStatus::from_str(&status)
            .map(|s| s.is_operational())
            .unwrap_or(false);
        if !operational {
            return Ok(ReconcileReport {
                company_id,
                active_contents,
                billable_quantity: billable,
                action: ReconcileAction::SkippedNoSubscription,
            });
        }

        let sub_id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid subscription ID: {}", e)))?;

        let subscription = Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await?;
        let found = find_addon_item(&subscription, &self.stripe.config().addon_price_id);

        let action = match (billable, found) {
            (0, None) => {
                self.persist_outcome(company_id, None).await?;
                ReconcileAction::NoChange
            }
            (0, Some(item)) => self.remove_item(company_id, &sub_id, item).await?,
            (n, None) => self.create_item(company_id, &sub_id, n).await?,
            (n, Some(item)) if item.quantity == n => {
                // Stripe matches; refresh bookkeeping only
                self.persist_outcome(company_id, Some(&item.id)).await?;
                ReconcileAction::NoChange
            }
            (n, Some(item)) => self.update_quantity(company_id, &sub_id, item, n).await?,
        };

        tracing::info!(
            company_id = %company_id,
            active_contents = active_contents,
            billable = billable,
            action = ?action,
            "Reconciled add-on quantity"
        );

        Ok(ReconcileReport {
            company_id,
            active_contents,
            billable_quantity: billable,
            action,
        })
    }

    /// Reconcile every company with an operational subscription.
    ///
    /// Errors are absorbed into per-company reports so one bad company never
    /// stops the sweep.
    pub async fn reconcile_all(&self) -> Vec<ReconcileReport> {
        let company_ids: Vec<(Uuid,)> = match sqlx::query_as(
            r#"
            SELECT company_id
            FROM company_monthly_subscriptions
            WHERE status IN ('trialing', 'active', 'past_due')
            ORDER BY company_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list subscriptions for reconciliation");
                return vec![];
            }
        };

        let mut reports = Vec::with_capacity(company_ids.len());
        for (company_id,) in company_ids {
            match self.reconcile_company(company_id).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(company_id = %company_id, error = %e, "Reconciliation failed");
                    reports.push(ReconcileReport {
                        company_id,
                        active_contents: 0,
                        billable_quantity: 0,
                        action: ReconcileAction::Error {
                            message: e.to_string(),
                        },
                    });
                }
            }
        }

        let changed = reports
            .iter()
            .filter(|r| {
                matches!(
                    r.action,
                    ReconcileAction::ItemCreated { .. }
                        | ReconcileAction::QuantityUpdated { .. }
                        | ReconcileAction::ItemRemoved { .. }
                )
            })
            .count();
        let errors = reports
            .iter()
            .filter(|r| matches!(r.action, ReconcileAction::Error { .. }))
            .count();

        tracing::info!(
            total = reports.len(),
            changed = changed,
            errors = errors,
            "Reconciliation sweep complete"
        );

        reports
    }

    async fn active_content_count(&self, company_id: Uuid) -> BillingResult<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM company_contents WHERE company_id = $1 AND status = 'active'",
        )
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Add the add-on item with the given quantity.
    async fn create_item(
        &self,
        company_id: Uuid,
        sub_id: &SubscriptionId,
        quantity: u64,
    ) -> BillingResult<ReconcileAction> {
        let addon_price_id = self.stripe.config().addon_price_id.clone();

        let params = UpdateSubscription {
            items: Some(vec![UpdateSubscriptionItems {
                price: Some(addon_price_id.clone()),
                quantity: Some(quantity),
                ..Default::default()
            }]),
            proration_behavior: Some(SubscriptionProrationBehavior::CreateProrations),
            ..Default::default()
        };

        let updated = Subscription::update(self.stripe.inner(), sub_id, params).await?;

        let item = find_addon_item(&updated, &addon_price_id).ok_or_else(|| {
            BillingError::StripeApi("add-on item missing after creation".to_string())
        })?;

        if let Err(db_err) = self.persist_outcome(company_id, Some(&item.id)).await {
            // Stripe succeeded but the database write did not; undo the
            // Stripe mutation so the two cannot drift.
            self.compensate_delete(company_id, sub_id, &item.id).await;
            return Err(db_err);
        }

        self.event_logger
            .log(
                Some(company_id),
                BillingEventType::AddonItemCreated,
                "reconcile",
                serde_json::json!({ "item_id": item.id, "quantity": quantity }),
            )
            .await;

        Ok(ReconcileAction::ItemCreated { item_id: item.id })
    }

    /// Update the quantity of the existing add-on item in place.
    async fn update_quantity(
        &self,
        company_id: Uuid,
        sub_id: &SubscriptionId,
        item: FoundAddonItem,
        quantity: u64,
    ) -> BillingResult<ReconcileAction> {
        let previous = item.quantity;

        let params = UpdateSubscription {
            items: Some(vec![UpdateSubscriptionItems {
                id: Some(item.id.clone()),
                quantity: Some(quantity),
                ..Default::default()
            }]),
            proration_behavior: Some(SubscriptionProrationBehavior::CreateProrations),
            ..Default::default()
        };

        Subscription::update(self.stripe.inner(), sub_id, params).await?;

        if let Err(db_err) = self.persist_outcome(company_id, Some(&item.id)).await {
            self.compensate_quantity(company_id, sub_id, &item.id, previous)
                .await;
            return Err(db_err);
        }

        self.event_logger
            .log(
                Some(company_id),
                BillingEventType::AddonQuantityUpdated,
                "reconcile",
                serde_json::json!({
                    "item_id": item.id,
                    "from": previous,
                    "to": quantity,
                }),
            )
            .await;

        Ok(ReconcileAction::QuantityUpdated {
            from: previous,
            to: quantity,
        })
    }

    /// Remove the add-on item once nothing is billable.
    async fn remove_item(
        &self,
        company_id: Uuid,
        sub_id: &SubscriptionId,
        item: FoundAddonItem,
    ) -> BillingResult<ReconcileAction> {
        let previous = item.quantity;

        let params = UpdateSubscription {
            items: Some(vec![UpdateSubscriptionItems {
                id: Some(item.id.clone()),
                deleted: Some(true),
                ..Default::default()
            }]),
            proration_behavior: Some(SubscriptionProrationBehavior::CreateProrations),
            ..Default::default()
        };

        Subscription::update(self.stripe.inner(), sub_id, params).await?;

        if let Err(db_err) = self.persist_outcome(company_id, None).await {
            self.compensate_recreate(company_id, sub_id, previous).await;
            return Err(db_err);
        }

        self.event_logger
            .log(
                Some(company_id),
                BillingEventType::AddonItemRemoved,
                "reconcile",
                serde_json::json!({ "item_id": item.id, "previous_quantity": previous }),
            )
            .await;

        Ok(ReconcileAction::ItemRemoved { item_id: item.id })
    }

    async fn persist_outcome(
        &self,
        company_id: Uuid,
        addon_item_id: Option<&str>,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE company_monthly_subscriptions
            SET addon_item_id = $2,
                last_reconciled_at = NOW(),
                updated_at = NOW()
            WHERE company_id = $1
            "#,
        )
        .bind(company_id)
        .bind(addon_item_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Compensation: delete an item whose creation could not be recorded.
    async fn compensate_delete(&self, company_id: Uuid, sub_id: &SubscriptionId, item_id: &str) {
        let params = UpdateSubscription {
            items: Some(vec![UpdateSubscriptionItems {
                id: Some(item_id.to_string()),
                deleted: Some(true),
                ..Default::default()
            }]),
            proration_behavior: Some(SubscriptionProrationBehavior::CreateProrations),
            ..Default::default()
        };

        match Subscription::update(self.stripe.inner(), sub_id, params).await {
            Ok(_) => {
                self.event_logger
                    .log(
                        Some(company_id),
                        BillingEventType::ReconcileCompensated,
                        "reconcile",
                        serde_json::json!({ "undo": "delete_created_item", "item_id": item_id }),
                    )
                    .await;
            }
            Err(e) => {
                tracing::error!(
                    company_id = %company_id,
                    item_id = %item_id,
                    error = %e,
                    "Compensation failed: created add-on item could not be removed"
                );
            }
        }
    }

    /// Compensation: restore the previous quantity after a failed DB write.
    async fn compensate_quantity(
        &self,
        company_id: Uuid,
        sub_id: &SubscriptionId,
        item_id: &str,
        previous: u64,
    ) {
        let params = UpdateSubscription {
            items: Some(vec![UpdateSubscriptionItems {
                id: Some(item_id.to_string()),
                quantity: Some(previous),
                ..Default::default()
            }]),
            proration_behavior: Some(SubscriptionProrationBehavior::CreateProrations),
            ..Default::default()
        };

        match Subscription::update(self.stripe.inner(), sub_id, params).await {
            Ok(_) => {
                self.event_logger
                    .log(
                        Some(company_id),
                        BillingEventType::ReconcileCompensated,
                        "reconcile",
                        serde_json::json!({
                            "undo": "restore_quantity",
                            "item_id": item_id,
                            "quantity": previous,
                        }),
                    )
                    .await;
            }
            Err(e) => {
                tracing::error!(
                    company_id = %company_id,
                    item_id = %item_id,
                    error = %e,
                    "Compensation failed: quantity could not be restored"
                );
            }
        }
    }

    /// Compensation: recreate the add-on item after a delete whose DB write
    /// failed.
    async fn compensate_recreate(&self, company_id: Uuid, sub_id: &SubscriptionId, quantity: u64) {
        let params = UpdateSubscription {
            items: Some(vec![UpdateSubscriptionItems {
                price: Some(self.stripe.config().addon_price_id.clone()),
                quantity: Some(quantity),
                ..Default::default()
            }]),
            proration_behavior: Some(SubscriptionProrationBehavior::CreateProrations),
            ..Default::default()
        };

        match Subscription::update(self.stripe.inner(), sub_id, params).await {
            Ok(_) => {
                self.event_logger
                    .log(
                        Some(company_id),
                        BillingEventType::ReconcileCompensated,
                        "reconcile",
                        serde_json::json!({ "undo": "recreate_item", "quantity": quantity }),
                    )
                    .await;
            }
            Err(e) => {
                tracing::error!(
                    company_id = %company_id,
                    error = %e,
                    "Compensation failed: removed add-on item could not be recreated"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_content_is_free() {
        assert_eq!(billable_quantity(0), 0);
        assert_eq!(billable_quantity(1), 0);
        assert_eq!(billable_quantity(2), 1);
        assert_eq!(billable_quantity(3), 2);
        assert_eq!(billable_quantity(10), 9);
    }

    #[test]
    fn negative_counts_do_not_underflow() {
        // COUNT(*) can't go negative, but the arithmetic shouldn't care
        assert_eq!(billable_quantity(-1), 0);
    }

    #[test]
    fn addon_item_matches_configured_price() {
        assert!(is_addon_item(
            Some("price_addon_123"),
            None,
            "price_addon_123"
        ));
        assert!(!is_addon_item(
            Some("price_base_456"),
            None,
            "price_addon_123"
        ));
    }

    #[test]
    fn addon_item_matches_nickname_fallback() {
        assert!(is_addon_item(
            Some("price_other"),
            Some("Additional content"),
            "price_addon_123"
        ));
        assert!(is_addon_item(
            Some("price_other"),
            Some("metered usage"),
            "price_addon_123"
        ));
        assert!(is_addon_item(
            Some("price_other"),
            Some("追加コンテンツ"),
            "price_addon_123"
        ));
        assert!(!is_addon_item(
            Some("price_other"),
            Some("Base plan"),
            "price_addon_123"
        ));
    }

    #[test]
    fn addon_item_requires_some_signal() {
        assert!(!is_addon_item(None, None, "price_addon_123"));
    }
}
