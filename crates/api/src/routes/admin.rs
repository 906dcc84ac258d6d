//! Admin / monitoring routes

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use botfleet_billing::{InvariantCheckSummary, ReconcileReport};

use crate::{error::ApiResult, state::AppState};

/// Run all billing invariant checks.
pub async fn run_invariants(
    State(state): State<AppState>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    let billing = state.billing()?;
    let summary = billing.invariants.run_all_checks().await?;

    if !summary.healthy {
        tracing::warn!(
            violations = summary.violations.len(),
            "Invariant check found violations"
        );
    }

    Ok(Json(summary))
}

#[derive(Debug, Serialize)]
pub struct ReconcileAllResponse {
    pub reports: Vec<ReconcileReport>,
}

/// Reconcile every company's add-on quantity.
pub async fn reconcile_all(State(state): State<AppState>) -> ApiResult<Json<ReconcileAllResponse>> {
    let billing = state.billing()?;
    let reports = billing.reconcile.reconcile_all().await;
    Ok(Json(ReconcileAllResponse { reports }))
}

#[derive(Debug, FromRow, Serialize)]
struct BackupCompany {
    id: Uuid,
    name: String,
    email: String,
    status: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

#[derive(Debug, FromRow, Serialize)]
struct BackupContent {
    company_id: Uuid,
    content_type: String,
    status: String,
}

#[derive(Debug, FromRow, Serialize)]
struct BackupSubscription {
    company_id: Uuid,
    stripe_subscription_id: String,
    status: String,
}

/// Export the administrative state as JSON.
///
/// Credentials are deliberately excluded; this is an operational snapshot,
/// not a disaster-recovery dump.
pub async fn export_backup(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let companies: Vec<BackupCompany> =
        sqlx::query_as("SELECT id, name, email, status, created_at FROM companies ORDER BY created_at")
            .fetch_all(&state.pool)
            .await?;

    let contents: Vec<BackupContent> = sqlx::query_as(
        "SELECT company_id, content_type, status FROM company_contents ORDER BY company_id",
    )
    .fetch_all(&state.pool)
    .await?;

    let subscriptions: Vec<BackupSubscription> = sqlx::query_as(
        "SELECT company_id, stripe_subscription_id, status FROM company_monthly_subscriptions",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(json!({
        "exported_at": OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        "companies": companies,
        "contents": contents,
        "subscriptions": subscriptions,
    })))
}
