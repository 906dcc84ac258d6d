//! Route registration

pub mod admin;
pub mod companies;
pub mod contents;
pub mod health;
pub mod line_accounts;
pub mod line_webhook;
pub mod notifications;
pub mod registration;
pub mod stripe_webhook;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(health::healthz))
        // Registration (the bare path predates the /api/v1 prefix and is
        // still what the marketing site posts to)
        .route(
            "/company-registration",
            post(registration::register_company),
        )
        .route(
            "/api/v1/companies/register",
            post(registration::register_company),
        )
        // Companies
        .route("/api/v1/companies", get(companies::list_companies))
        .route(
            "/api/v1/companies/{id}",
            get(companies::get_company)
                .patch(companies::update_company)
                .delete(companies::delete_company),
        )
        // LINE accounts + provisioning
        .route(
            "/api/v1/companies/{id}/line-account",
            get(line_accounts::get_line_account).put(line_accounts::upsert_line_account),
        )
        .route(
            "/api/v1/companies/{id}/provision",
            post(line_accounts::provision_company),
        )
        // Content modules
        .route(
            "/api/v1/companies/{id}/contents",
            get(contents::list_contents).post(contents::enable_content),
        )
        .route(
            "/api/v1/companies/{id}/contents/{content_type}",
            delete(contents::disable_content),
        )
        .route(
            "/api/v1/companies/{id}/reconcile",
            post(contents::reconcile_company),
        )
        // Notifications
        .route(
            "/api/v1/companies/{id}/notifications",
            post(notifications::send_notification),
        )
        // Admin / monitoring
        .route("/api/v1/admin/invariants", get(admin::run_invariants))
        .route("/api/v1/admin/reconcile", get(admin::reconcile_all))
        .route("/api/v1/admin/backup", get(admin::export_backup))
        // External webhooks
        .route("/webhooks/stripe", post(stripe_webhook::stripe_webhook))
        .route(
            "/line/webhook/{company_id}",
            post(line_webhook::line_webhook),
        )
        .with_state(state)
}
