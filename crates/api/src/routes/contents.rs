//! Content module routes
//!
//! Enabling or disabling a module immediately reconciles the company's
//! Stripe add-on quantity. A failed inline reconciliation is reported but
//! does not roll back the content change; the worker sweep repairs any gap
//! on its next run.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use botfleet_billing::{CompanyContent, ReconcileReport};
use botfleet_shared::ContentType;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct ContentsResponse {
    pub contents: Vec<CompanyContent>,
    pub active_count: i64,
    pub billable_quantity: u64,
}

pub async fn list_contents(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> ApiResult<Json<ContentsResponse>> {
    let billing = state.billing()?;

    let contents = billing.contents.list_contents(company_id).await?;
    let active_count = billing.contents.active_content_count(company_id).await?;

    Ok(Json(ContentsResponse {
        contents,
        active_count,
        billable_quantity: botfleet_billing::billable_quantity(active_count),
    }))
}

#[derive(Debug, Deserialize)]
pub struct EnableContentRequest {
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct ContentMutationResponse {
    pub content: Option<CompanyContent>,
    /// Outcome of the inline reconciliation; None when it failed (the
    /// worker sweep will retry)
    pub reconcile: Option<ReconcileReport>,
}

pub async fn enable_content(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Json(request): Json<EnableContentRequest>,
) -> ApiResult<Json<ContentMutationResponse>> {
    let billing = state.billing()?;

    let content_type = ContentType::from_str(&request.content_type).ok_or_else(|| {
        ApiError::BadRequest(format!("invalid content type: {}", request.content_type))
    })?;

    let content = billing.contents.enable_content(company_id, content_type).await?;
    let reconcile = run_inline_reconcile(&state, company_id).await;

    Ok(Json(ContentMutationResponse {
        content: Some(content),
        reconcile,
    }))
}

pub async fn disable_content(
    State(state): State<AppState>,
    Path((company_id, content_type)): Path<(Uuid, String)>,
) -> ApiResult<Json<ContentMutationResponse>> {
    let billing = state.billing()?;

    let content_type = ContentType::from_str(&content_type)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid content type: {}", content_type)))?;

    billing.contents.disable_content(company_id, content_type).await?;
    let reconcile = run_inline_reconcile(&state, company_id).await;

    Ok(Json(ContentMutationResponse {
        content: None,
        reconcile,
    }))
}

pub async fn reconcile_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<ReconcileReport>)> {
    let billing = state.billing()?;
    let report = billing.reconcile.reconcile_company(company_id).await?;
    Ok((StatusCode::OK, Json(report)))
}

async fn run_inline_reconcile(state: &AppState, company_id: Uuid) -> Option<ReconcileReport> {
    let billing = state.billing.as_ref()?;
    match billing.reconcile.reconcile_company(company_id).await {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::warn!(
                company_id = %company_id,
                error = %e,
                "Inline reconciliation failed; worker sweep will retry"
            );
            None
        }
    }
}
