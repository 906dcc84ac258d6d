//! Billing invariants
//!
//! Runnable consistency checks over the company/billing tables. Each check
//! is a read-only SQL query; violations carry enough context to debug. These
//! replace the pile of one-off repair scripts the previous system accreted:
//! instead of patching drift after the fact, drift is detected and reported.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Company affected
    pub company_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - billing may be wrong right now
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - potential issue, should investigate
    Medium,
    /// Low - minor inconsistency, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct ActiveNoSubscriptionRow {
    company_id: Uuid,
    name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct UnreconciledAddonRow {
    company_id: Uuid,
    name: String,
    active_contents: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CanceledNoHistoryRow {
    company_id: Uuid,
    stripe_subscription_id: String,
}

#[derive(Debug, sqlx::FromRow)]
struct OrphanUserStateRow {
    company_id: Uuid,
    state_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct ContentsOnInactiveRow {
    company_id: Uuid,
    name: String,
    status: String,
    active_contents: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct DeployedWithoutProjectRow {
    company_id: Uuid,
    channel_id: String,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
}

impl InvariantChecker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_active_company_has_subscription().await?);
        violations.extend(self.check_addon_item_recorded().await?);
        violations.extend(self.check_canceled_has_history().await?);
        violations.extend(self.check_user_states_have_line_account().await?);
        violations.extend(self.check_contents_on_operational_companies().await?);
        violations.extend(self.check_deployed_has_project_id().await?);

        let checks_run = 6;
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: Active companies have an operational subscription row.
    ///
    /// An active company nobody is billing is revenue silently leaking.
    async fn check_active_company_has_subscription(
        &self,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<ActiveNoSubscriptionRow> = sqlx::query_as(
            r#"
            SELECT c.id AS company_id, c.name
            FROM companies c
            WHERE c.status = 'active'
              AND NOT EXISTS (
                  SELECT 1 FROM company_monthly_subscriptions s
                  WHERE s.company_id = c.id
                    AND s.status IN ('trialing', 'active', 'past_due')
              )
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "active_company_has_subscription".to_string(),
                company_ids: vec![row.company_id],
                description: format!(
                    "Company '{}' is active but has no operational subscription",
                    row.name
                ),
                context: serde_json::json!({ "company_name": row.name }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 2: Companies with billable contents have an add-on item
    /// recorded.
    ///
    /// More than one active content module with no addon_item_id means the
    /// add-on item was never created or its creation was never persisted;
    /// either way the next reconciliation run must fix it.
    async fn check_addon_item_recorded(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<UnreconciledAddonRow> = sqlx::query_as(
            r#"
            SELECT c.id AS company_id, c.name,
                   (SELECT COUNT(*) FROM company_contents cc
                    WHERE cc.company_id = c.id AND cc.status = 'active') AS active_contents
            FROM companies c
            JOIN company_monthly_subscriptions s ON s.company_id = c.id
            WHERE s.status IN ('trialing', 'active', 'past_due')
              AND s.addon_item_id IS NULL
              AND (SELECT COUNT(*) FROM company_contents cc
                   WHERE cc.company_id = c.id AND cc.status = 'active') > 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "addon_item_recorded".to_string(),
                company_ids: vec![row.company_id],
                description: format!(
                    "Company '{}' has {} active contents but no add-on item recorded",
                    row.name, row.active_contents
                ),
                context: serde_json::json!({
                    "company_name": row.name,
                    "active_contents": row.active_contents,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 3: Canceled subscriptions have a cancellation history row.
    async fn check_canceled_has_history(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<CanceledNoHistoryRow> = sqlx::query_as(
            r#"
            SELECT s.company_id, s.stripe_subscription_id
            FROM company_monthly_subscriptions s
            WHERE s.status = 'canceled'
              AND NOT EXISTS (
                  SELECT 1 FROM cancellation_history h
                  WHERE h.stripe_subscription_id = s.stripe_subscription_id
              )
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "canceled_has_history".to_string(),
                company_ids: vec![row.company_id],
                description: "Canceled subscription has no cancellation history".to_string(),
                context: serde_json::json!({
                    "stripe_subscription_id": row.stripe_subscription_id,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 4: User conversation state only exists for companies with a
    /// LINE account.
    async fn check_user_states_have_line_account(
        &self,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<OrphanUserStateRow> = sqlx::query_as(
            r#"
            SELECT u.company_id, COUNT(*) AS state_count
            FROM user_states u
            WHERE NOT EXISTS (
                SELECT 1 FROM company_line_accounts la
                WHERE la.company_id = u.company_id
            )
            GROUP BY u.company_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "user_states_have_line_account".to_string(),
                company_ids: vec![row.company_id],
                description: format!(
                    "{} user state rows exist for a company with no LINE account",
                    row.state_count
                ),
                context: serde_json::json!({ "state_count": row.state_count }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Invariant 5: Active contents belong to operational companies.
    async fn check_contents_on_operational_companies(
        &self,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<ContentsOnInactiveRow> = sqlx::query_as(
            r#"
            SELECT c.id AS company_id, c.name, c.status, COUNT(cc.id) AS active_contents
            FROM companies c
            JOIN company_contents cc ON cc.company_id = c.id AND cc.status = 'active'
            WHERE c.status IN ('suspended', 'deleted')
            GROUP BY c.id, c.name, c.status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "contents_on_operational_companies".to_string(),
                company_ids: vec![row.company_id],
                description: format!(
                    "Company '{}' is {} but still has {} active content modules",
                    row.name, row.status, row.active_contents
                ),
                context: serde_json::json!({
                    "company_name": row.name,
                    "company_status": row.status,
                    "active_contents": row.active_contents,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Invariant 6: Deployed LINE accounts record their Railway project.
    async fn check_deployed_has_project_id(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<DeployedWithoutProjectRow> = sqlx::query_as(
            r#"
            SELECT la.company_id, la.channel_id
            FROM company_line_accounts la
            WHERE la.deployment_status = 'deployed'
              AND la.railway_project_id IS NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: "deployed_has_project_id".to_string(),
                company_ids: vec![row.company_id],
                description: "LINE account is marked deployed but has no Railway project id"
                    .to_string(),
                context: serde_json::json!({ "channel_id": row.channel_id }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "active_company_has_subscription" => self.check_active_company_has_subscription().await,
            "addon_item_recorded" => self.check_addon_item_recorded().await,
            "canceled_has_history" => self.check_canceled_has_history().await,
            "user_states_have_line_account" => self.check_user_states_have_line_account().await,
            "contents_on_operational_companies" => {
                self.check_contents_on_operational_companies().await
            }
            "deployed_has_project_id" => self.check_deployed_has_project_id().await,
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "active_company_has_subscription",
            "addon_item_recorded",
            "canceled_has_history",
            "user_states_have_line_account",
            "contents_on_operational_companies",
            "deployed_has_project_id",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
        assert_eq!(ViolationSeverity::Low.to_string(), "LOW");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 6);
        assert!(checks.contains(&"active_company_has_subscription"));
        assert!(checks.contains(&"addon_item_recorded"));
    }
}
