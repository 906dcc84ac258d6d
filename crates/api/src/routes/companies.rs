//! Company CRUD routes

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use botfleet_shared::CompanyStatus;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize, FromRow)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub status: String,
    pub stripe_customer_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct ListCompaniesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompanyListResponse {
    pub companies: Vec<Company>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

pub async fn list_companies(
    State(state): State<AppState>,
    Query(query): Query<ListCompaniesQuery>,
) -> ApiResult<Json<CompanyListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = (page - 1) * limit;

    let status_filter = match &query.status {
        Some(s) => {
            CompanyStatus::from_str(s)
                .ok_or_else(|| ApiError::BadRequest(format!("invalid status: {}", s)))?;
            Some(s.clone())
        }
        None => None,
    };

    let companies: Vec<Company> = sqlx::query_as(
        r#"
        SELECT id, name, email, status, stripe_customer_id, created_at, updated_at
        FROM companies
        WHERE ($1::TEXT IS NULL OR status = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(&status_filter)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM companies WHERE ($1::TEXT IS NULL OR status = $1)")
            .bind(&status_filter)
            .fetch_one(&state.pool)
            .await?;

    Ok(Json(CompanyListResponse {
        companies,
        total,
        page,
        limit,
    }))
}

pub async fn get_company(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Company>> {
    let company: Option<Company> = sqlx::query_as(
        r#"
        SELECT id, name, email, status, stripe_customer_id, created_at, updated_at
        FROM companies
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;

    company
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Company {}", id)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub status: Option<String>,
}

pub async fn update_company(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCompanyRequest>,
) -> ApiResult<Json<Company>> {
    if let Some(status) = &request.status {
        CompanyStatus::from_str(status)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid status: {}", status)))?;
    }
    if let Some(name) = &request.name {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest("name must not be empty".into()));
        }
    }

    let company: Option<Company> = sqlx::query_as(
        r#"
        UPDATE companies
        SET name = COALESCE($2, name),
            status = COALESCE($3, status),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, email, status, stripe_customer_id, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(request.name.as_deref().map(str::trim))
    .bind(&request.status)
    .fetch_optional(&state.pool)
    .await?;

    company
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Company {}", id)))
}

#[derive(Debug, Serialize)]
pub struct DeleteCompanyResponse {
    pub deleted: bool,
    pub cascaded: CascadedCounts,
}

/// Child-row counts removed alongside the company, reported back so an
/// operator can see exactly what the cascade took with it.
#[derive(Debug, Serialize)]
pub struct CascadedCounts {
    pub line_accounts: i64,
    pub payments: i64,
    pub contents: i64,
    pub user_states: i64,
}

pub async fn delete_company(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteCompanyResponse>> {
    let counts: (i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM company_line_accounts WHERE company_id = $1),
            (SELECT COUNT(*) FROM company_payments WHERE company_id = $1),
            (SELECT COUNT(*) FROM company_contents WHERE company_id = $1),
            (SELECT COUNT(*) FROM user_states WHERE company_id = $1)
        "#,
    )
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    let result = sqlx::query("DELETE FROM companies WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("Company {}", id)));
    }

    tracing::info!(
        company_id = %id,
        line_accounts = counts.0,
        payments = counts.1,
        contents = counts.2,
        user_states = counts.3,
        "Company deleted with cascaded rows"
    );

    Ok(Json(DeleteCompanyResponse {
        deleted: true,
        cascaded: CascadedCounts {
            line_accounts: counts.0,
            payments: counts.1,
            contents: counts.2,
            user_states: counts.3,
        },
    }))
}
