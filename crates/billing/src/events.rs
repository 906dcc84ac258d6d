//! Billing event audit log
//!
//! Every billing mutation appends a row to `billing_events`. The log is
//! append-only and written best-effort: a failed audit insert is logged but
//! never fails the operation it describes.

use sqlx::PgPool;
use uuid::Uuid;

/// Kinds of billing events recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingEventType {
    RegistrationCompleted,
    SubscriptionSynced,
    SubscriptionCanceled,
    InvoicePaid,
    InvoicePaymentFailed,
    ContentEnabled,
    ContentDisabled,
    AddonItemCreated,
    AddonQuantityUpdated,
    AddonItemRemoved,
    ReconcileCompensated,
}

impl BillingEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingEventType::RegistrationCompleted => "registration_completed",
            BillingEventType::SubscriptionSynced => "subscription_synced",
            BillingEventType::SubscriptionCanceled => "subscription_canceled",
            BillingEventType::InvoicePaid => "invoice_paid",
            BillingEventType::InvoicePaymentFailed => "invoice_payment_failed",
            BillingEventType::ContentEnabled => "content_enabled",
            BillingEventType::ContentDisabled => "content_disabled",
            BillingEventType::AddonItemCreated => "addon_item_created",
            BillingEventType::AddonQuantityUpdated => "addon_quantity_updated",
            BillingEventType::AddonItemRemoved => "addon_item_removed",
            BillingEventType::ReconcileCompensated => "reconcile_compensated",
        }
    }
}

/// Appends billing events to the audit table
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an event. Best-effort; never fails the caller.
    pub async fn log(
        &self,
        company_id: Option<Uuid>,
        event_type: BillingEventType,
        actor: &str,
        detail: serde_json::Value,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO billing_events (company_id, event_type, actor, detail)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(company_id)
        .bind(event_type.as_str())
        .bind(actor)
        .bind(detail)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                company_id = ?company_id,
                event_type = event_type.as_str(),
                error = %e,
                "Failed to write billing event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names_are_snake_case() {
        assert_eq!(
            BillingEventType::AddonQuantityUpdated.as_str(),
            "addon_quantity_updated"
        );
        assert_eq!(
            BillingEventType::RegistrationCompleted.as_str(),
            "registration_completed"
        );
    }
}
