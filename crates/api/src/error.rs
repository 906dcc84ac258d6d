//! API error type and the uniform JSON error envelope
//!
//! Every route returns `ApiError` so the wire shape is `{error, code}`
//! everywhere instead of per-route ad hoc envelopes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use botfleet_billing::BillingError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Billing is not configured")]
    BillingUnavailable,

    #[error("Database error")]
    Database(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Database(e.to_string())
    }
}

impl From<BillingError> for ApiError {
    fn from(e: BillingError) -> Self {
        match e {
            BillingError::WebhookSignatureInvalid => ApiError::InvalidSignature,
            BillingError::CompanyNotFound(id) => ApiError::NotFound(format!("Company {}", id)),
            BillingError::NoSubscription(id) => {
                ApiError::BadRequest(format!("Company {} has no subscription", id))
            }
            BillingError::InvalidContentType(msg) => ApiError::BadRequest(msg),
            BillingError::Config(msg) => ApiError::Internal(msg),
            BillingError::Database(msg) => ApiError::Database(msg),
            BillingError::StripeApi(msg) => ApiError::Upstream(msg),
            BillingError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, format!("{} not found", msg)),
            ApiError::InvalidSignature => {
                (StatusCode::BAD_REQUEST, "Invalid signature".to_string())
            }
            ApiError::BillingUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Billing is not configured".to_string(),
            ),
            ApiError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Upstream(msg) => {
                tracing::error!(error = %msg, "Upstream service error");
                (StatusCode::BAD_GATEWAY, "Upstream service error".to_string())
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_signature_maps_to_400() {
        let response = ApiError::InvalidSignature.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn database_errors_do_not_leak_details() {
        let response = ApiError::Database("connection refused at 10.0.0.3".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn billing_signature_error_converts_to_400() {
        let api: ApiError = BillingError::WebhookSignatureInvalid.into();
        assert!(matches!(api, ApiError::InvalidSignature));
    }
}
