//! LINE account credential storage and bot provisioning

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use botfleet_shared::DeploymentStatus;

use crate::{
    error::{ApiError, ApiResult},
    provisioning::{ProvisionOutcome, ProvisionRequest},
    state::AppState,
};

#[derive(Debug, FromRow)]
struct LineAccountRow {
    company_id: Uuid,
    channel_id: String,
    channel_secret: String,
    channel_access_token: String,
    webhook_url: Option<String>,
    deployment_status: String,
    railway_project_id: Option<String>,
    railway_service_id: Option<String>,
    updated_at: OffsetDateTime,
}

/// Credentials are never echoed back in full.
fn mask(value: &str) -> String {
    if value.len() <= 4 {
        "****".to_string()
    } else {
        format!("****{}", &value[value.len() - 4..])
    }
}

#[derive(Debug, Serialize)]
pub struct LineAccountResponse {
    pub company_id: Uuid,
    pub channel_id: String,
    pub channel_secret_masked: String,
    pub channel_access_token_masked: String,
    pub webhook_url: Option<String>,
    pub deployment_status: String,
    pub railway_project_id: Option<String>,
    pub railway_service_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<LineAccountRow> for LineAccountResponse {
    fn from(row: LineAccountRow) -> Self {
        Self {
            company_id: row.company_id,
            channel_id: row.channel_id,
            channel_secret_masked: mask(&row.channel_secret),
            channel_access_token_masked: mask(&row.channel_access_token),
            webhook_url: row.webhook_url,
            deployment_status: row.deployment_status,
            railway_project_id: row.railway_project_id,
            railway_service_id: row.railway_service_id,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpsertLineAccountRequest {
    pub channel_id: String,
    pub channel_secret: String,
    pub channel_access_token: String,
}

/// Store (or replace) a company's LINE channel credentials.
///
/// One LINE account per company; updating replaces the credentials in place.
/// The webhook URL is derived from our own base URL so it cannot drift from
/// what the webhook route actually serves.
pub async fn upsert_line_account(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
    Json(request): Json<UpsertLineAccountRequest>,
) -> ApiResult<Json<LineAccountResponse>> {
    if request.channel_id.trim().is_empty()
        || request.channel_secret.trim().is_empty()
        || request.channel_access_token.trim().is_empty()
    {
        return Err(ApiError::BadRequest(
            "channel_id, channel_secret and channel_access_token are required".into(),
        ));
    }

    let company: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM companies WHERE id = $1")
        .bind(company_id)
        .fetch_optional(&state.pool)
        .await?;
    if company.is_none() {
        return Err(ApiError::NotFound(format!("Company {}", company_id)));
    }

    let webhook_url = state.config.line_webhook_url(company_id);

    let row: LineAccountRow = sqlx::query_as(
        r#"
        INSERT INTO company_line_accounts
            (company_id, channel_id, channel_secret, channel_access_token, webhook_url)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (company_id) DO UPDATE
        SET channel_id = EXCLUDED.channel_id,
            channel_secret = EXCLUDED.channel_secret,
            channel_access_token = EXCLUDED.channel_access_token,
            webhook_url = EXCLUDED.webhook_url,
            updated_at = NOW()
        RETURNING company_id, channel_id, channel_secret, channel_access_token,
                  webhook_url, deployment_status, railway_project_id,
                  railway_service_id, updated_at
        "#,
    )
    .bind(company_id)
    .bind(request.channel_id.trim())
    .bind(request.channel_secret.trim())
    .bind(request.channel_access_token.trim())
    .bind(&webhook_url)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(
        company_id = %company_id,
        channel_id = %row.channel_id,
        "LINE account credentials stored"
    );

    Ok(Json(row.into()))
}

pub async fn get_line_account(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> ApiResult<Json<LineAccountResponse>> {
    let row: Option<LineAccountRow> = sqlx::query_as(
        r#"
        SELECT company_id, channel_id, channel_secret, channel_access_token,
               webhook_url, deployment_status, railway_project_id,
               railway_service_id, updated_at
        FROM company_line_accounts
        WHERE company_id = $1
        "#,
    )
    .bind(company_id)
    .fetch_optional(&state.pool)
    .await?;

    row.map(|r| Json(r.into()))
        .ok_or_else(|| ApiError::NotFound(format!("LINE account for company {}", company_id)))
}

/// Run the provisioning chain for a company.
///
/// Refuses to run when the bot is already deployed; a second project for the
/// same company is exactly the failure mode the guard exists for.
pub async fn provision_company(
    State(state): State<AppState>,
    Path(company_id): Path<Uuid>,
) -> ApiResult<Json<ProvisionOutcome>> {
    let company: Option<(String,)> = sqlx::query_as("SELECT name FROM companies WHERE id = $1")
        .bind(company_id)
        .fetch_optional(&state.pool)
        .await?;
    let Some((company_name,)) = company else {
        return Err(ApiError::NotFound(format!("Company {}", company_id)));
    };

    let account: Option<LineAccountRow> = sqlx::query_as(
        r#"
        SELECT company_id, channel_id, channel_secret, channel_access_token,
               webhook_url, deployment_status, railway_project_id,
               railway_service_id, updated_at
        FROM company_line_accounts
        WHERE company_id = $1
        "#,
    )
    .bind(company_id)
    .fetch_optional(&state.pool)
    .await?;

    let Some(account) = account else {
        return Err(ApiError::BadRequest(
            "Register LINE channel credentials before provisioning".into(),
        ));
    };

    if account.deployment_status == DeploymentStatus::Deployed.as_str() {
        return Err(ApiError::BadRequest(format!(
            "Company {} already has a deployed bot (project {:?})",
            company_id, account.railway_project_id
        )));
    }

    sqlx::query(
        r#"
        UPDATE company_line_accounts
        SET deployment_status = 'provisioning', updated_at = NOW()
        WHERE company_id = $1
        "#,
    )
    .bind(company_id)
    .execute(&state.pool)
    .await?;

    let request = ProvisionRequest {
        company_id,
        company_name,
        channel_id: account.channel_id,
        channel_secret: account.channel_secret,
        channel_access_token: account.channel_access_token,
        webhook_url: account
            .webhook_url
            .unwrap_or_else(|| state.config.line_webhook_url(company_id)),
    };

    let outcome = match state.provisioner.provision(&request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            sqlx::query(
                r#"
                UPDATE company_line_accounts
                SET deployment_status = 'failed', updated_at = NOW()
                WHERE company_id = $1
                "#,
            )
            .bind(company_id)
            .execute(&state.pool)
            .await?;
            return Err(ApiError::Upstream(e.to_string()));
        }
    };

    sqlx::query(
        r#"
        UPDATE company_line_accounts
        SET deployment_status = $2,
            railway_project_id = COALESCE($3, railway_project_id),
            railway_service_id = COALESCE($4, railway_service_id),
            updated_at = NOW()
        WHERE company_id = $1
        "#,
    )
    .bind(company_id)
    .bind(outcome.deployment_status.as_str())
    .bind(&outcome.railway_project_id)
    .bind(&outcome.railway_service_id)
    .execute(&state.pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO usage_logs (company_id, event_type, detail)
        VALUES ($1, 'provisioning_completed', $2)
        "#,
    )
    .bind(company_id)
    .bind(serde_json::json!({
        "strategy": outcome.strategy,
        "deployment_status": outcome.deployment_status.as_str(),
        "railway_project_id": outcome.railway_project_id,
    }))
    .execute(&state.pool)
    .await?;

    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking_keeps_only_the_tail() {
        assert_eq!(mask("supersecrettoken"), "****oken");
        assert_eq!(mask("abc"), "****");
    }
}
