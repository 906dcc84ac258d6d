//! Notification push routes

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendNotificationResponse {
    pub recipients: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Push a text message to every LINE user known for the company.
pub async fn send_notification(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Json(request): Json<SendNotificationRequest>,
) -> ApiResult<Json<SendNotificationResponse>> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".into()));
    }

    let token: Option<(String,)> = sqlx::query_as(
        "SELECT channel_access_token FROM company_line_accounts WHERE company_id = $1",
    )
    .bind(company_id)
    .fetch_optional(&state.pool)
    .await?;

    let Some((channel_access_token,)) = token else {
        return Err(ApiError::NotFound(format!(
            "LINE account for company {}",
            company_id
        )));
    };

    let user_ids = state.user_states.known_user_ids(company_id).await?;
    let recipients = user_ids.len();

    let mut sent = 0;
    let mut failed = 0;
    for user_id in &user_ids {
        match state
            .line
            .push_message(&channel_access_token, user_id, message)
            .await
        {
            Ok(()) => sent += 1,
            Err(e) => {
                failed += 1;
                tracing::warn!(
                    company_id = %company_id,
                    error = %e,
                    "Failed to push notification to user"
                );
            }
        }
    }

    sqlx::query(
        r#"
        INSERT INTO usage_logs (company_id, event_type, detail)
        VALUES ($1, 'notification_sent', $2)
        "#,
    )
    .bind(company_id)
    .bind(serde_json::json!({ "recipients": recipients, "sent": sent, "failed": failed }))
    .execute(&state.pool)
    .await?;

    tracing::info!(
        company_id = %company_id,
        recipients = recipients,
        sent = sent,
        failed = failed,
        "Notification push complete"
    );

    Ok(Json(SendNotificationResponse {
        recipients,
        sent,
        failed,
    }))
}
