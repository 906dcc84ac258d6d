//! Generic deploy-hook strategy
//!
//! Posts the provisioning request to a configured webhook and trusts the
//! receiving system to carry out the deployment. The outcome stays at
//! `provisioning` until the external system reports back through the admin
//! API.

use async_trait::async_trait;
use serde_json::json;

use super::{ProvisionError, ProvisionOutcome, ProvisionRequest, ProvisionStrategy};
use botfleet_shared::DeploymentStatus;

pub struct DeployWebhook {
    http: reqwest::Client,
    url: String,
}

impl DeployWebhook {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl ProvisionStrategy for DeployWebhook {
    fn name(&self) -> &'static str {
        "deploy_webhook"
    }

    async fn attempt(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let body = json!({
            "company_id": request.company_id,
            "company_name": request.company_name,
            "channel_id": request.channel_id,
            "webhook_url": request.webhook_url,
        });

        let response = self.http.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisionError::Api(format!(
                "deploy hook returned {}: {}",
                status, body
            )));
        }

        Ok(ProvisionOutcome {
            strategy: self.name(),
            deployment_status: DeploymentStatus::Provisioning,
            railway_project_id: None,
            railway_service_id: None,
            instructions: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn posts_request_and_reports_provisioning() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/deploy")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "company_name": "Acme",
            })))
            .with_status(202)
            .create_async()
            .await;

        let strategy = DeployWebhook::new(reqwest::Client::new(), format!("{}/deploy", server.url()));
        let outcome = strategy
            .attempt(&ProvisionRequest {
                company_id: Uuid::new_v4(),
                company_name: "Acme".to_string(),
                channel_id: "2000001".to_string(),
                channel_secret: "secret".to_string(),
                channel_access_token: "token".to_string(),
                webhook_url: "https://example.com/hook".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.deployment_status, DeploymentStatus::Provisioning);
        mock.assert_async().await;
    }
}
