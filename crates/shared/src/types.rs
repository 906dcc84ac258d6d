//! Domain types shared across crates
//!
//! All of these are stored as lowercase text columns; the enums exist so the
//! valid states are written down in exactly one place.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanyStatus {
    /// Registered but checkout has not completed yet
    Pending,
    Active,
    Suspended,
    /// Soft-deleted; rows are removed by the explicit delete route
    Deleted,
}

impl CompanyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyStatus::Pending => "pending",
            CompanyStatus::Active => "active",
            CompanyStatus::Suspended => "suspended",
            CompanyStatus::Deleted => "deleted",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CompanyStatus::Pending),
            "active" => Some(CompanyStatus::Active),
            "suspended" => Some(CompanyStatus::Suspended),
            "deleted" => Some(CompanyStatus::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompanyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Add-on content module a company can enable.
///
/// Each active module beyond the first is billed as quantity on the Stripe
/// add-on subscription item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// AI bookkeeping assistant ("AI経理秘書")
    AiAccounting,
    /// Automated FAQ responder
    FaqBot,
    /// Appointment reminder flows
    ReminderFlows,
    /// Customer survey module
    Surveys,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::AiAccounting => "ai_accounting",
            ContentType::FaqBot => "faq_bot",
            ContentType::ReminderFlows => "reminder_flows",
            ContentType::Surveys => "surveys",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ai_accounting" => Some(ContentType::AiAccounting),
            "faq_bot" => Some(ContentType::FaqBot),
            "reminder_flows" => Some(ContentType::ReminderFlows),
            "surveys" => Some(ContentType::Surveys),
            _ => None,
        }
    }

    pub fn all() -> Vec<ContentType> {
        vec![
            ContentType::AiAccounting,
            ContentType::FaqBot,
            ContentType::ReminderFlows,
            ContentType::Surveys,
        ]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ContentType::AiAccounting => "AI経理秘書",
            ContentType::FaqBot => "FAQ Bot",
            ContentType::ReminderFlows => "Reminder Flows",
            ContentType::Surveys => "Surveys",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deployment status of a company's LINE bot on Railway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    NotProvisioned,
    Provisioning,
    Deployed,
    Failed,
    /// Remote strategies failed; manual setup instructions were issued
    ManualSetup,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::NotProvisioned => "not_provisioned",
            DeploymentStatus::Provisioning => "provisioning",
            DeploymentStatus::Deployed => "deployed",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::ManualSetup => "manual_setup",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_provisioned" => Some(DeploymentStatus::NotProvisioned),
            "provisioning" => Some(DeploymentStatus::Provisioning),
            "deployed" => Some(DeploymentStatus::Deployed),
            "failed" => Some(DeploymentStatus::Failed),
            "manual_setup" => Some(DeploymentStatus::ManualSetup),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stripe subscription status as mirrored into `company_monthly_subscriptions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }

    /// Statuses that keep a company billable and its bot running.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing | SubscriptionStatus::Active | SubscriptionStatus::PastDue
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_round_trips() {
        for ct in ContentType::all() {
            assert_eq!(ContentType::from_str(ct.as_str()), Some(ct));
        }
        assert_eq!(ContentType::from_str("no_such_module"), None);
    }

    #[test]
    fn company_status_round_trips() {
        for s in ["pending", "active", "suspended", "deleted"] {
            let parsed = CompanyStatus::from_str(s).unwrap();
            assert_eq!(parsed.as_str(), s);
        }
    }

    #[test]
    fn operational_statuses() {
        assert!(SubscriptionStatus::Trialing.is_operational());
        assert!(SubscriptionStatus::Active.is_operational());
        assert!(SubscriptionStatus::PastDue.is_operational());
        assert!(!SubscriptionStatus::Canceled.is_operational());
    }
}
