//! Per-user conversation state
//!
//! A single flag per (company, LINE user): whether the welcome message has
//! been sent. LINE redelivers follow events, so the flag flip has to be
//! atomic with the check.

use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct UserStateStore {
    pool: PgPool,
}

impl UserStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Mark the welcome as sent. Returns true only for the first caller;
    /// replays and duplicate follow events get false.
    pub async fn mark_welcome_sent(
        &self,
        company_id: Uuid,
        line_user_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO user_states (company_id, line_user_id, welcome_sent)
            VALUES ($1, $2, TRUE)
            ON CONFLICT (company_id, line_user_id) DO UPDATE
            SET welcome_sent = TRUE, last_event_at = NOW()
            WHERE user_states.welcome_sent = FALSE
            RETURNING id
            "#,
        )
        .bind(company_id)
        .bind(line_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Record activity from a user without touching the welcome flag.
    pub async fn touch(&self, company_id: Uuid, line_user_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_states (company_id, line_user_id)
            VALUES ($1, $2)
            ON CONFLICT (company_id, line_user_id) DO UPDATE
            SET last_event_at = NOW()
            "#,
        )
        .bind(company_id)
        .bind(line_user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Drop state when a user unfollows; a re-follow gets a fresh welcome.
    pub async fn clear(&self, company_id: Uuid, line_user_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM user_states WHERE company_id = $1 AND line_user_id = $2")
            .bind(company_id)
            .bind(line_user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// All known user ids for a company, for notification pushes.
    pub async fn known_user_ids(&self, company_id: Uuid) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT line_user_id FROM user_states WHERE company_id = $1 ORDER BY created_at",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Remove rows idle longer than the given number of days.
    pub async fn delete_stale(&self, older_than_days: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM user_states WHERE last_event_at < NOW() - ($1 || ' days')::INTERVAL",
        )
        .bind(older_than_days)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
