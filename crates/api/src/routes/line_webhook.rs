//! Per-company LINE webhook endpoint
//!
//! The path carries the company id, so each delivery is verified against
//! that company's own channel secret. Verification runs on the raw bytes
//! before parsing; an invalid or missing signature is a 400 with no side
//! effects.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    line::{self, LineWebhookEvent, LineWebhookRequest},
    state::AppState,
};

#[derive(Debug, FromRow)]
struct ChannelCredentials {
    channel_secret: String,
    channel_access_token: String,
}

pub async fn line_webhook(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let credentials: Option<ChannelCredentials> = sqlx::query_as(
        "SELECT channel_secret, channel_access_token FROM company_line_accounts WHERE company_id = $1",
    )
    .bind(company_id)
    .fetch_optional(&state.pool)
    .await?;

    let Some(credentials) = credentials else {
        return Err(ApiError::NotFound(format!(
            "LINE account for company {}",
            company_id
        )));
    };

    let signature = headers
        .get("x-line-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::InvalidSignature)?;

    if !line::signature::verify(&credentials.channel_secret, &body, signature) {
        tracing::warn!(company_id = %company_id, "LINE webhook signature rejected");
        return Err(ApiError::InvalidSignature);
    }

    let request: LineWebhookRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid webhook body: {}", e)))?;

    for event in &request.events {
        if let Err(e) = handle_event(&state, company_id, &credentials, event).await {
            // One bad event must not make LINE redeliver the whole batch
            tracing::error!(
                company_id = %company_id,
                event_type = %event.event_type,
                error = %e,
                "Failed to handle LINE event"
            );
        }
    }

    Ok(StatusCode::OK)
}

async fn handle_event(
    state: &AppState,
    company_id: Uuid,
    credentials: &ChannelCredentials,
    event: &LineWebhookEvent,
) -> ApiResult<()> {
    let user_id = event
        .source
        .as_ref()
        .and_then(|s| s.user_id.as_deref());

    sqlx::query(
        r#"
        INSERT INTO usage_logs (company_id, event_type, detail)
        VALUES ($1, 'line_event_received', $2)
        "#,
    )
    .bind(company_id)
    .bind(serde_json::json!({
        "line_event_type": event.event_type,
        "user_id": user_id,
    }))
    .execute(&state.pool)
    .await?;

    match event.event_type.as_str() {
        "follow" => {
            let Some(user_id) = user_id else {
                return Ok(());
            };

            // welcome_sent guards against LINE redelivering follow events
            let first_time = state
                .user_states
                .mark_welcome_sent(company_id, user_id)
                .await?;

            if first_time {
                state
                    .line
                    .push_message(
                        &credentials.channel_access_token,
                        user_id,
                        line::WELCOME_MESSAGE,
                    )
                    .await
                    .map_err(|e| ApiError::Upstream(e.to_string()))?;
                tracing::info!(company_id = %company_id, "Welcome message sent");
            }
        }
        "unfollow" => {
            if let Some(user_id) = user_id {
                state.user_states.clear(company_id, user_id).await?;
            }
        }
        "message" => {
            if let Some(user_id) = user_id {
                state.user_states.touch(company_id, user_id).await?;
            }

            let text = event.message.as_ref().and_then(|m| m.text.as_deref());
            if let (Some(reply_token), Some(text)) = (event.reply_token.as_deref(), text) {
                state
                    .line
                    .reply_message(
                        &credentials.channel_access_token,
                        reply_token,
                        line::canned_reply(text),
                    )
                    .await
                    .map_err(|e| ApiError::Upstream(e.to_string()))?;
            }
        }
        other => {
            tracing::debug!(
                company_id = %company_id,
                event_type = %other,
                "Unhandled LINE event type"
            );
        }
    }

    Ok(())
}
