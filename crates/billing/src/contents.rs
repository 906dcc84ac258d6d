//! Company content module management
//!
//! One row per add-on module a company has enabled. The count of active rows
//! is what reconciliation bills against; this service only touches the
//! database and leaves Stripe to `reconcile`.

use botfleet_shared::ContentType;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventLogger, BillingEventType};

/// A company's enabled content module
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct CompanyContent {
    pub id: Uuid,
    pub company_id: Uuid,
    pub content_type: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Content module service
pub struct ContentService {
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl ContentService {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self { pool, event_logger }
    }

    /// Enable a content module for a company.
    ///
    /// Re-enabling a disabled module reactivates the existing row, so a
    /// company never accumulates duplicate rows for one module.
    pub async fn enable_content(
        &self,
        company_id: Uuid,
        content_type: ContentType,
    ) -> BillingResult<CompanyContent> {
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM companies WHERE id = $1")
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(BillingError::CompanyNotFound(company_id));
        }

        let content: CompanyContent = sqlx::query_as(
            r#"
            INSERT INTO company_contents (company_id, content_type, status)
            VALUES ($1, $2, 'active')
            ON CONFLICT (company_id, content_type)
                DO UPDATE SET status = 'active', updated_at = NOW()
            RETURNING id, company_id, content_type, status, created_at, updated_at
            "#,
        )
        .bind(company_id)
        .bind(content_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        self.event_logger
            .log(
                Some(company_id),
                BillingEventType::ContentEnabled,
                "api",
                serde_json::json!({ "content_type": content_type.as_str() }),
            )
            .await;

        tracing::info!(
            company_id = %company_id,
            content_type = %content_type,
            "Content module enabled"
        );

        Ok(content)
    }

    /// Disable a content module for a company.
    pub async fn disable_content(
        &self,
        company_id: Uuid,
        content_type: ContentType,
    ) -> BillingResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE company_contents
            SET status = 'disabled', updated_at = NOW()
            WHERE company_id = $1 AND content_type = $2 AND status = 'active'
            "#,
        )
        .bind(company_id)
        .bind(content_type.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::InvalidContentType(format!(
                "{} is not active for this company",
                content_type
            )));
        }

        self.event_logger
            .log(
                Some(company_id),
                BillingEventType::ContentDisabled,
                "api",
                serde_json::json!({ "content_type": content_type.as_str() }),
            )
            .await;

        tracing::info!(
            company_id = %company_id,
            content_type = %content_type,
            "Content module disabled"
        );

        Ok(())
    }

    /// List all content rows for a company, active and disabled.
    pub async fn list_contents(&self, company_id: Uuid) -> BillingResult<Vec<CompanyContent>> {
        let contents: Vec<CompanyContent> = sqlx::query_as(
            r#"
            SELECT id, company_id, content_type, status, created_at, updated_at
            FROM company_contents
            WHERE company_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(contents)
    }

    /// Count of active content modules. This count is the source of truth
    /// for the Stripe add-on quantity.
    pub async fn active_content_count(&self, company_id: Uuid) -> BillingResult<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM company_contents WHERE company_id = $1 AND status = 'active'",
        )
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }
}
