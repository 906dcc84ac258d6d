//! Per-company bot provisioning
//!
//! Getting a company's bot running on Railway has no single reliable API
//! path, so provisioning is an ordered list of strategies tried in sequence:
//! Railway template deploy, Railway project-from-repo, a generic deploy
//! webhook, and finally human-readable manual instructions. The first
//! strategy to succeed wins; each attempt is logged with the strategy name
//! so the audit trail shows exactly which path produced a deployment.

pub mod manual;
pub mod railway;
pub mod webhook;

use async_trait::async_trait;
use botfleet_shared::DeploymentStatus;
use serde::Serialize;
use uuid::Uuid;

pub use manual::ManualInstructions;
pub use railway::{RailwayClient, RailwayGithubRepo, RailwayTemplate};
pub use webhook::DeployWebhook;

use crate::config::Config;

/// Everything a strategy needs to stand up one company's bot
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub company_id: Uuid,
    pub company_name: String,
    pub channel_id: String,
    pub channel_secret: String,
    pub channel_access_token: String,
    /// Webhook URL the bot should register with LINE
    pub webhook_url: String,
}

/// Result of a successful provisioning attempt
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionOutcome {
    /// Which strategy produced this outcome
    pub strategy: &'static str,
    pub deployment_status: DeploymentStatus,
    pub railway_project_id: Option<String>,
    pub railway_service_id: Option<String>,
    /// Set by the manual strategy
    pub instructions: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("strategy not configured: {0}")]
    NotConfigured(&'static str),

    #[error("provisioning request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provisioning API error: {0}")]
    Api(String),

    #[error("all provisioning strategies failed")]
    Exhausted,
}

/// A single way of getting a bot deployed
#[async_trait]
pub trait ProvisionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(&self, request: &ProvisionRequest)
        -> Result<ProvisionOutcome, ProvisionError>;
}

/// Ordered strategy chain
pub struct Provisioner {
    strategies: Vec<Box<dyn ProvisionStrategy>>,
}

impl Provisioner {
    pub fn new(strategies: Vec<Box<dyn ProvisionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Build the production chain from config. Strategies missing their
    /// configuration are skipped at attempt time, and the manual fallback is
    /// always last so a company is never left without a path forward.
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let mut strategies: Vec<Box<dyn ProvisionStrategy>> = Vec::new();

        if let Some(token) = &config.railway_api_token {
            let client = RailwayClient::new(http.clone(), token.clone());
            if let Some(template_code) = &config.railway_template_code {
                strategies.push(Box::new(RailwayTemplate::new(
                    client.clone(),
                    template_code.clone(),
                )));
            }
            if let Some(repo) = &config.bot_source_repo {
                strategies.push(Box::new(RailwayGithubRepo::new(client, repo.clone())));
            }
        }

        if let Some(url) = &config.deploy_webhook_url {
            strategies.push(Box::new(DeployWebhook::new(http, url.clone())));
        }

        strategies.push(Box::new(ManualInstructions));

        Self { strategies }
    }

    /// Try each strategy in order and return the first success.
    pub async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        for strategy in &self.strategies {
            tracing::info!(
                company_id = %request.company_id,
                strategy = strategy.name(),
                "Attempting provisioning strategy"
            );

            match strategy.attempt(request).await {
                Ok(outcome) => {
                    tracing::info!(
                        company_id = %request.company_id,
                        strategy = strategy.name(),
                        deployment_status = %outcome.deployment_status,
                        project_id = ?outcome.railway_project_id,
                        "Provisioning strategy succeeded"
                    );
                    return Ok(outcome);
                }
                Err(e) => {
                    tracing::warn!(
                        company_id = %request.company_id,
                        strategy = strategy.name(),
                        error = %e,
                        "Provisioning strategy failed, trying next"
                    );
                }
            }
        }

        tracing::error!(
            company_id = %request.company_id,
            "All provisioning strategies failed"
        );
        Err(ProvisionError::Exhausted)
    }

    /// Names of the configured strategies, in order.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            company_id: Uuid::new_v4(),
            company_name: "Acme".to_string(),
            channel_id: "2000001".to_string(),
            channel_secret: "secret".to_string(),
            channel_access_token: "token".to_string(),
            webhook_url: "https://admin.example.com/line/webhook/x".to_string(),
        }
    }

    struct AlwaysFails {
        name: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProvisionStrategy for AlwaysFails {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(
            &self,
            _request: &ProvisionRequest,
        ) -> Result<ProvisionOutcome, ProvisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProvisionError::Api("boom".to_string()))
        }
    }

    struct AlwaysSucceeds {
        name: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProvisionStrategy for AlwaysSucceeds {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(
            &self,
            _request: &ProvisionRequest,
        ) -> Result<ProvisionOutcome, ProvisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProvisionOutcome {
                strategy: self.name,
                deployment_status: DeploymentStatus::Deployed,
                railway_project_id: Some("proj_1".to_string()),
                railway_service_id: None,
                instructions: None,
            })
        }
    }

    #[tokio::test]
    async fn first_success_wins_and_later_strategies_are_not_tried() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));

        let provisioner = Provisioner::new(vec![
            Box::new(AlwaysSucceeds {
                name: "first",
                calls: first_calls.clone(),
            }),
            Box::new(AlwaysSucceeds {
                name: "second",
                calls: second_calls.clone(),
            }),
        ]);

        let outcome = provisioner.provision(&request()).await.unwrap();
        assert_eq!(outcome.strategy, "first");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_fall_through_in_declared_order() {
        let failing_calls = Arc::new(AtomicUsize::new(0));
        let succeeding_calls = Arc::new(AtomicUsize::new(0));

        let provisioner = Provisioner::new(vec![
            Box::new(AlwaysFails {
                name: "railway_template",
                calls: failing_calls.clone(),
            }),
            Box::new(AlwaysFails {
                name: "railway_github_repo",
                calls: failing_calls.clone(),
            }),
            Box::new(AlwaysSucceeds {
                name: "deploy_webhook",
                calls: succeeding_calls.clone(),
            }),
        ]);

        let outcome = provisioner.provision(&request()).await.unwrap();
        assert_eq!(outcome.strategy, "deploy_webhook");
        assert_eq!(failing_calls.load(Ordering::SeqCst), 2);
        assert_eq!(succeeding_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn manual_fallback_terminates_the_chain() {
        let provisioner = Provisioner::new(vec![
            Box::new(AlwaysFails {
                name: "railway_template",
                calls: Arc::new(AtomicUsize::new(0)),
            }),
            Box::new(ManualInstructions),
        ]);

        let outcome = provisioner.provision(&request()).await.unwrap();
        assert_eq!(outcome.strategy, "manual_instructions");
        assert_eq!(outcome.deployment_status, DeploymentStatus::ManualSetup);
        assert!(outcome.instructions.is_some());
    }

    #[tokio::test]
    async fn exhausted_chain_is_an_error() {
        let provisioner = Provisioner::new(vec![Box::new(AlwaysFails {
            name: "only",
            calls: Arc::new(AtomicUsize::new(0)),
        })]);

        let err = provisioner.provision(&request()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Exhausted));
    }
}
