//! Stripe webhook endpoint

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Receive a Stripe event.
///
/// Signature verification happens on the raw body before anything else;
/// invalid signatures get a 400 with no side effects.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<StatusCode> {
    let billing = state.billing()?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::InvalidSignature)?;

    let event = billing.webhooks.verify_event(&body, signature)?;
    billing.webhooks.handle_event(event).await?;

    Ok(StatusCode::OK)
}
