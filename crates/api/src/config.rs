//! Server configuration
//!
//! Everything the server needs is read once at startup into an explicit
//! config value that gets passed to constructors. Nothing reads environment
//! variables after boot.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Postgres connection string
    pub database_url: String,
    /// Direct (non-pooler) connection string for migrations, when different
    pub database_direct_url: Option<String>,
    /// Base URL of this deployment, used for checkout redirects and the
    /// per-company LINE webhook URLs handed to provisioning
    pub app_base_url: String,
    /// Railway API token; template/repo provisioning is skipped without it
    pub railway_api_token: Option<String>,
    /// Railway template code for the bot template deploy strategy
    pub railway_template_code: Option<String>,
    /// GitHub repo ("owner/name") holding the bot source, for the
    /// repo-based provisioning strategy
    pub bot_source_repo: Option<String>,
    /// Generic deploy-hook URL tried when the Railway strategies fail
    pub deploy_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_direct_url: std::env::var("DATABASE_DIRECT_URL").ok(),
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            railway_api_token: std::env::var("RAILWAY_API_TOKEN").ok(),
            railway_template_code: std::env::var("RAILWAY_TEMPLATE_CODE").ok(),
            bot_source_repo: std::env::var("BOT_SOURCE_REPO").ok(),
            deploy_webhook_url: std::env::var("DEPLOY_WEBHOOK_URL").ok(),
        })
    }

    /// Webhook URL a provisioned bot should be configured with.
    pub fn line_webhook_url(&self, company_id: uuid::Uuid) -> String {
        format!("{}/line/webhook/{}", self.app_base_url, company_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn config_reads_environment() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/botfleet_test");
        std::env::set_var("APP_BASE_URL", "https://admin.example.com");
        std::env::remove_var("RAILWAY_API_TOKEN");

        let config = Config::from_env().unwrap();
        assert_eq!(config.database_url, "postgres://localhost/botfleet_test");
        assert_eq!(config.app_base_url, "https://admin.example.com");
        assert!(config.railway_api_token.is_none());

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("APP_BASE_URL");
    }

    #[test]
    #[serial]
    fn missing_database_url_is_an_error() {
        std::env::remove_var("DATABASE_URL");
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn webhook_url_includes_company_id() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/botfleet_test");
        std::env::set_var("APP_BASE_URL", "https://admin.example.com");

        let config = Config::from_env().unwrap();
        let id = uuid::Uuid::nil();
        assert_eq!(
            config.line_webhook_url(id),
            format!("https://admin.example.com/line/webhook/{}", id)
        );

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("APP_BASE_URL");
    }
}
