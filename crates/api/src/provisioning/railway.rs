//! Railway GraphQL strategies
//!
//! Railway's GraphQL API is the primary deployment path. The contract has
//! shifted under us before, so the repo-based strategy tries more than one
//! mutation shape for the service source before giving up.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ProvisionError, ProvisionOutcome, ProvisionRequest, ProvisionStrategy};
use botfleet_shared::DeploymentStatus;

const RAILWAY_ENDPOINT: &str = "https://backboard.railway.app/graphql/v2";

/// Minimal Railway GraphQL client
#[derive(Clone)]
pub struct RailwayClient {
    http: reqwest::Client,
    token: String,
    endpoint: String,
}

impl RailwayClient {
    pub fn new(http: reqwest::Client, token: String) -> Self {
        Self {
            http,
            token,
            endpoint: RAILWAY_ENDPOINT.to_string(),
        }
    }

    /// Client against a non-default endpoint (tests).
    pub fn with_endpoint(http: reqwest::Client, token: String, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            token,
            endpoint: endpoint.into(),
        }
    }

    /// Execute one GraphQL operation and return the `data` value.
    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value, ProvisionError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisionError::Api(format!(
                "Railway returned {}: {}",
                status, body
            )));
        }

        let body: Value = response.json().await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages: Vec<String> = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .map(String::from)
                    .collect();
                return Err(ProvisionError::Api(messages.join("; ")));
            }
        }

        body.get("data")
            .cloned()
            .ok_or_else(|| ProvisionError::Api("Railway response had no data".to_string()))
    }
}

/// Environment variables every bot deployment needs
fn bot_variables(request: &ProvisionRequest) -> Value {
    json!({
        "LINE_CHANNEL_ID": request.channel_id,
        "LINE_CHANNEL_SECRET": request.channel_secret,
        "LINE_CHANNEL_ACCESS_TOKEN": request.channel_access_token,
        "WEBHOOK_URL": request.webhook_url,
    })
}

/// Sanitized Railway project name for a company
fn project_name(request: &ProvisionRequest) -> String {
    let slug: String = request
        .company_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("linebot-{}-{}", slug.trim_matches('-'), &request.company_id.to_string()[..8])
}

/// Deploy the bot from a Railway template.
pub struct RailwayTemplate {
    client: RailwayClient,
    template_code: String,
}

impl RailwayTemplate {
    pub fn new(client: RailwayClient, template_code: String) -> Self {
        Self {
            client,
            template_code,
        }
    }
}

#[async_trait]
impl ProvisionStrategy for RailwayTemplate {
    fn name(&self) -> &'static str {
        "railway_template"
    }

    async fn attempt(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let query = r#"
            mutation templateDeploy($input: TemplateDeployInput!) {
                templateDeploy(input: $input) {
                    projectId
                    workflowId
                }
            }
        "#;

        let variables = json!({
            "input": {
                "templateCode": self.template_code,
                "projectName": project_name(request),
                "variables": bot_variables(request),
            }
        });

        let data = self.client.graphql(query, variables).await?;

        let project_id = data
            .pointer("/templateDeploy/projectId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProvisionError::Api("templateDeploy returned no projectId".to_string())
            })?
            .to_string();

        Ok(ProvisionOutcome {
            strategy: self.name(),
            deployment_status: DeploymentStatus::Deployed,
            railway_project_id: Some(project_id),
            railway_service_id: None,
            instructions: None,
        })
    }
}

/// Create a project and a service from the bot's GitHub repo.
pub struct RailwayGithubRepo {
    client: RailwayClient,
    repo: String,
}

impl RailwayGithubRepo {
    pub fn new(client: RailwayClient, repo: String) -> Self {
        Self { client, repo }
    }

    async fn create_project(&self, request: &ProvisionRequest) -> Result<String, ProvisionError> {
        let query = r#"
            mutation projectCreate($input: ProjectCreateInput!) {
                projectCreate(input: $input) { id }
            }
        "#;
        let variables = json!({ "input": { "name": project_name(request) } });

        let data = self.client.graphql(query, variables).await?;
        data.pointer("/projectCreate/id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ProvisionError::Api("projectCreate returned no id".to_string()))
    }

    /// The service-source input shape has changed across Railway API
    /// revisions; try the current shape first and the older one second.
    async fn create_service(&self, project_id: &str) -> Result<String, ProvisionError> {
        let query = r#"
            mutation serviceCreate($input: ServiceCreateInput!) {
                serviceCreate(input: $input) { id }
            }
        "#;

        let source_shapes = [
            json!({ "repo": self.repo }),
            json!({ "github": { "repo": self.repo } }),
        ];

        let mut last_error = ProvisionError::Api("no source shape attempted".to_string());
        for source in source_shapes {
            let variables = json!({
                "input": { "projectId": project_id, "source": source }
            });

            match self.client.graphql(query, variables).await {
                Ok(data) => {
                    if let Some(id) = data.pointer("/serviceCreate/id").and_then(Value::as_str) {
                        return Ok(id.to_string());
                    }
                    last_error =
                        ProvisionError::Api("serviceCreate returned no id".to_string());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "serviceCreate source shape rejected");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn set_variables(
        &self,
        project_id: &str,
        service_id: &str,
        request: &ProvisionRequest,
    ) -> Result<(), ProvisionError> {
        let query = r#"
            mutation variableCollectionUpsert($input: VariableCollectionUpsertInput!) {
                variableCollectionUpsert(input: $input)
            }
        "#;
        let variables = json!({
            "input": {
                "projectId": project_id,
                "serviceId": service_id,
                "variables": bot_variables(request),
            }
        });

        self.client.graphql(query, variables).await?;
        Ok(())
    }
}

#[async_trait]
impl ProvisionStrategy for RailwayGithubRepo {
    fn name(&self) -> &'static str {
        "railway_github_repo"
    }

    async fn attempt(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let project_id = self.create_project(request).await?;
        let service_id = self.create_service(&project_id).await?;
        self.set_variables(&project_id, &service_id, request).await?;

        Ok(ProvisionOutcome {
            strategy: self.name(),
            deployment_status: DeploymentStatus::Deployed,
            railway_project_id: Some(project_id),
            railway_service_id: Some(service_id),
            instructions: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request() -> ProvisionRequest {
        ProvisionRequest {
            company_id: Uuid::new_v4(),
            company_name: "Acme Co".to_string(),
            channel_id: "2000001".to_string(),
            channel_secret: "secret".to_string(),
            channel_access_token: "token".to_string(),
            webhook_url: "https://admin.example.com/line/webhook/x".to_string(),
        }
    }

    #[test]
    fn project_names_are_slugged() {
        let req = request();
        let name = project_name(&req);
        assert!(name.starts_with("linebot-acme-co-"));
        assert!(!name.contains(' '));
    }

    #[tokio::test]
    async fn template_deploy_parses_project_id() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .match_header("authorization", "Bearer rw-token")
            .with_status(200)
            .with_body(
                r#"{"data":{"templateDeploy":{"projectId":"proj_abc","workflowId":"wf_1"}}}"#,
            )
            .create_async()
            .await;

        let client =
            RailwayClient::with_endpoint(reqwest::Client::new(), "rw-token".to_string(), server.url());
        let strategy = RailwayTemplate::new(client, "tmpl_code".to_string());

        let outcome = strategy.attempt(&request()).await.unwrap();
        assert_eq!(outcome.strategy, "railway_template");
        assert_eq!(outcome.railway_project_id.as_deref(), Some("proj_abc"));
        assert_eq!(outcome.deployment_status, DeploymentStatus::Deployed);
    }

    #[tokio::test]
    async fn graphql_errors_become_api_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"errors":[{"message":"Not Authorized"}]}"#)
            .create_async()
            .await;

        let client =
            RailwayClient::with_endpoint(reqwest::Client::new(), "bad".to_string(), server.url());
        let strategy = RailwayTemplate::new(client, "tmpl_code".to_string());

        let err = strategy.attempt(&request()).await.unwrap_err();
        match err {
            ProvisionError::Api(msg) => assert!(msg.contains("Not Authorized")),
            other => panic!("expected Api error, got {:?}", other),
        }
    }
}
