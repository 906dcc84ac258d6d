//! LINE Messaging API client
//!
//! Thin reqwest wrapper over the reply and push endpoints. The base URL is
//! injectable so tests can point it at a local mock server. Pushes retry
//! with exponential backoff; replies do not, because reply tokens are
//! single-use and short-lived.

use serde_json::json;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

const LINE_API_BASE: &str = "https://api.line.me";

#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("LINE API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LINE API returned {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Clone)]
pub struct LineClient {
    http: reqwest::Client,
    base_url: String,
}

impl LineClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: LINE_API_BASE.to_string(),
        }
    }

    /// Client against a non-default endpoint (tests).
    pub fn with_base_url(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Reply to a webhook event using its reply token.
    pub async fn reply_message(
        &self,
        channel_access_token: &str,
        reply_token: &str,
        text: &str,
    ) -> Result<(), LineError> {
        let body = json!({
            "replyToken": reply_token,
            "messages": [{ "type": "text", "text": text }],
        });
        self.post_message("/v2/bot/message/reply", channel_access_token, &body)
            .await
    }

    /// Push a message to a user.
    pub async fn push_message(
        &self,
        channel_access_token: &str,
        to: &str,
        text: &str,
    ) -> Result<(), LineError> {
        let body = json!({
            "to": to,
            "messages": [{ "type": "text", "text": text }],
        });

        let strategy = ExponentialBackoff::from_millis(200).map(jitter).take(2);
        Retry::spawn(strategy, || {
            self.post_message("/v2/bot/message/push", channel_access_token, &body)
        })
        .await
    }

    async fn post_message(
        &self,
        path: &str,
        channel_access_token: &str,
        body: &serde_json::Value,
    ) -> Result<(), LineError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(channel_access_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LineError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_sends_bearer_token_and_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/bot/message/push")
            .match_header("authorization", "Bearer test-token")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "to": "U123",
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = LineClient::with_base_url(reqwest::Client::new(), server.url());
        client
            .push_message("test-token", "U123", "hello")
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn reply_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/bot/message/reply")
            .with_status(401)
            .with_body(r#"{"message":"Invalid channel access token"}"#)
            .create_async()
            .await;

        let client = LineClient::with_base_url(reqwest::Client::new(), server.url());
        let err = client
            .reply_message("bad-token", "reply-token", "hello")
            .await
            .unwrap_err();

        match err {
            LineError::Api { status, .. } => assert_eq!(status, 401),
            other => panic!("expected Api error, got {:?}", other),
        }
    }
}
