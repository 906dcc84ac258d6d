//! Company registration
//!
//! Registration is a two-step flow: this route creates the Stripe checkout
//! session (with trial), and the `checkout.session.completed` webhook
//! finalizes the company row. Nothing is written to `companies` here, so an
//! abandoned checkout leaves no debris and a retried one cannot duplicate.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use botfleet_billing::CheckoutResponse;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RegisterCompanyRequest {
    pub company_name: String,
    pub email: String,
}

pub async fn register_company(
    State(state): State<AppState>,
    Json(request): Json<RegisterCompanyRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let company_name = request.company_name.trim();
    let email = request.email.trim().to_lowercase();

    if company_name.is_empty() {
        return Err(ApiError::BadRequest("company_name must not be empty".into()));
    }
    if !email.contains('@') {
        return Err(ApiError::BadRequest(format!("invalid email: {}", email)));
    }

    let billing = state.billing()?;

    let customer = billing.customer.find_or_create(company_name, &email).await?;
    let session = billing
        .checkout
        .create_registration_checkout(company_name, &email, &customer.id)
        .await?;

    tracing::info!(
        email = %email,
        session_id = %session.id,
        "Registration checkout created"
    );

    Ok(Json(session.into()))
}
