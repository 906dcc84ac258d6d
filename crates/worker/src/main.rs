//! Botfleet Background Worker
//!
//! Handles scheduled jobs including:
//! - Add-on quantity reconciliation sweep (nightly at 2:00 UTC)
//! - Stale subscription status sync from Stripe (hourly)
//! - Trial-ending reminders (daily at 9:00 UTC)
//! - User state and usage log cleanup (daily at 3:00 UTC)
//! - Billing invariant checks (daily at 4:00 UTC)
//! - Health check heartbeat (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use botfleet_api::line::UserStateStore;
use botfleet_billing::{BillingService, ReconcileAction, ReconcileReport};
use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    #[allow(clippy::expect_used)] // Fail-fast on startup if required config is missing
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

/// Log results of a reconciliation sweep
fn log_reconcile_results(reports: &[ReconcileReport]) {
    let unchanged = reports
        .iter()
        .filter(|r| matches!(r.action, ReconcileAction::NoChange))
        .count();
    let changed = reports
        .iter()
        .filter(|r| {
            matches!(
                r.action,
                ReconcileAction::ItemCreated { .. }
                    | ReconcileAction::QuantityUpdated { .. }
                    | ReconcileAction::ItemRemoved { .. }
            )
        })
        .count();
    let skipped = reports
        .iter()
        .filter(|r| matches!(r.action, ReconcileAction::SkippedNoSubscription))
        .count();
    let errors = reports
        .iter()
        .filter(|r| matches!(r.action, ReconcileAction::Error { .. }))
        .count();

    info!(
        total = reports.len(),
        unchanged = unchanged,
        changed = changed,
        skipped = skipped,
        errors = errors,
        "Reconciliation sweep complete"
    );

    for report in reports {
        if let ReconcileAction::Error { message } = &report.action {
            error!(company_id = %report.company_id, error = %message, "Reconciliation failed");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Botfleet Worker");

    // Create database pool
    let pool = create_db_pool().await?;

    // Create billing service
    let billing = match BillingService::from_env(pool.clone()) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            // If Stripe isn't configured, run in minimal mode
            warn!(error = %e, "Failed to create billing service - running in minimal mode");
            info!("Worker running without Stripe integration");

            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                info!("Worker heartbeat (minimal mode)");
            }
        }
    };

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Nightly reconciliation sweep (2:00 UTC)
    // Repairs any drift between content counts and Stripe add-on quantities
    // left by failed inline reconciliations.
    let reconcile_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 2 * * *", move |_uuid, _l| {
            let billing = reconcile_billing.clone();
            Box::pin(async move {
                info!("Running nightly add-on reconciliation sweep");
                let reports = billing.reconcile.reconcile_all().await;
                log_reconcile_results(&reports);
            })
        })?)
        .await?;
    info!("Scheduled: Add-on reconciliation sweep (daily at 2:00 UTC)");

    // Job 2: Stale subscription sync (hourly)
    let sync_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let billing = sync_billing.clone();
            Box::pin(async move {
                info!("Running stale subscription sync");
                match billing.subscriptions.sync_stale_subscriptions(60).await {
                    Ok(synced) => info!(synced = synced, "Subscription sync complete"),
                    Err(e) => error!(error = %e, "Subscription sync failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Stale subscription sync (hourly)");

    // Job 3: Trial-ending reminders (daily at 9:00 UTC)
    // Records a reminder event per company whose trial ends within 3 days;
    // each reminder is logged once per trial via the usage log dedup below.
    let reminder_billing = billing.clone();
    let reminder_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 0 9 * * *", move |_uuid, _l| {
            let billing = reminder_billing.clone();
            let pool = reminder_pool.clone();
            Box::pin(async move {
                info!("Running trial-ending reminder job");

                let ending = match billing.subscriptions.trial_ending_companies(3).await {
                    Ok(companies) => companies,
                    Err(e) => {
                        error!(error = %e, "Failed to list trial-ending companies");
                        return;
                    }
                };

                let total = ending.len();
                let mut recorded = 0;

                for company in ending {
                    // One reminder per company per trial end date
                    let inserted = sqlx::query(
                        r#"
                        INSERT INTO usage_logs (company_id, event_type, detail)
                        SELECT $1, 'trial_ending_reminder', $2
                        WHERE NOT EXISTS (
                            SELECT 1 FROM usage_logs
                            WHERE company_id = $1
                              AND event_type = 'trial_ending_reminder'
                              AND detail->>'trial_end' = $2->>'trial_end'
                        )
                        "#,
                    )
                    .bind(company.company_id)
                    .bind(serde_json::json!({
                        "email": company.email,
                        "trial_end": company.trial_end
                            .format(&time::format_description::well_known::Rfc3339)
                            .unwrap_or_default(),
                    }))
                    .execute(&pool)
                    .await;

                    match inserted {
                        Ok(result) if result.rows_affected() > 0 => {
                            recorded += 1;
                            info!(
                                company_id = %company.company_id,
                                trial_end = %company.trial_end,
                                "Trial-ending reminder recorded"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(
                                company_id = %company.company_id,
                                error = %e,
                                "Failed to record trial reminder"
                            );
                        }
                    }
                }

                info!(
                    total = total,
                    recorded = recorded,
                    "Trial-ending reminder job complete"
                );
            })
        })?)
        .await?;
    info!("Scheduled: Trial-ending reminders (daily at 9:00 UTC)");

    // Job 4: Cleanup stale user states and old usage logs (daily at 3:00 UTC)
    let cleanup_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 0 3 * * *", move |_uuid, _l| {
            let pool = cleanup_pool.clone();
            Box::pin(async move {
                info!("Running cleanup job");

                let user_states = UserStateStore::new(pool.clone());
                match user_states.delete_stale(90).await {
                    Ok(deleted) => info!(deleted = deleted, "Stale user states removed"),
                    Err(e) => error!(error = %e, "User state cleanup failed"),
                }

                let result = sqlx::query(
                    "DELETE FROM usage_logs WHERE created_at < NOW() - INTERVAL '180 days'",
                )
                .execute(&pool)
                .await;

                match result {
                    Ok(r) => info!(deleted = r.rows_affected(), "Old usage logs removed"),
                    Err(e) => error!(error = %e, "Usage log cleanup failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: State and log cleanup (daily at 3:00 UTC)");

    // Job 5: Billing invariant check (daily at 4:00 UTC)
    let invariant_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 4 * * *", move |_uuid, _l| {
            let billing = invariant_billing.clone();
            Box::pin(async move {
                info!("Running billing invariant checks");
                match billing.invariants.run_all_checks().await {
                    Ok(summary) => {
                        if summary.healthy {
                            info!(
                                checks_run = summary.checks_run,
                                "All billing invariants hold"
                            );
                        } else {
                            for violation in &summary.violations {
                                warn!(
                                    invariant = %violation.invariant,
                                    severity = %violation.severity,
                                    company_ids = ?violation.company_ids,
                                    description = %violation.description,
                                    "Billing invariant violated"
                                );
                            }
                        }
                    }
                    Err(e) => error!(error = %e, "Invariant check failed"),
                }
            })
        })?)
        .await?;
    info!("Scheduled: Billing invariant checks (daily at 4:00 UTC)");

    // Job 6: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Botfleet Worker started successfully with 6 scheduled jobs");

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
