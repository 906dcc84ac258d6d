//! Manual-instructions fallback
//!
//! Terminal strategy: always succeeds by producing setup instructions an
//! operator can follow by hand. Keeps a company out of limbo when every
//! remote strategy is down or unconfigured.

use async_trait::async_trait;

use super::{ProvisionError, ProvisionOutcome, ProvisionRequest, ProvisionStrategy};
use botfleet_shared::DeploymentStatus;

pub struct ManualInstructions;

#[async_trait]
impl ProvisionStrategy for ManualInstructions {
    fn name(&self) -> &'static str {
        "manual_instructions"
    }

    async fn attempt(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let instructions = format!(
            "Manual setup required for company {} ({}).\n\
             1. Create a Railway project named for the company.\n\
             2. Deploy the bot service from the bot repository.\n\
             3. Set LINE_CHANNEL_ID={}, LINE_CHANNEL_SECRET and \
             LINE_CHANNEL_ACCESS_TOKEN from the company's LINE account.\n\
             4. Register the webhook URL with LINE: {}\n\
             5. Update the company's deployment status via the admin API once live.",
            request.company_name, request.company_id, request.channel_id, request.webhook_url,
        );

        Ok(ProvisionOutcome {
            strategy: self.name(),
            deployment_status: DeploymentStatus::ManualSetup,
            railway_project_id: None,
            railway_service_id: None,
            instructions: Some(instructions),
        })
    }
}
