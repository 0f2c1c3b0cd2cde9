use super::{ServiceId, ShopId};
use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Webhook,
    Merchant,
    Client,
}

/// What happened. Shared by the audit log and the service timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Activity {
    ServiceCreated,
    PortalTokenCreated,
    DepositPaid,
    MilestonePaid,
    MilestonePaymentRequested,
    StatusChanged,
    Approved,
    RevisionRequested,
    DeliverableAdded,
    AdminOverride,
}

/// Shop-scoped, append-only audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub shop_id: ShopId,
    pub service_id: Option<ServiceId>,
    pub activity: Activity,
    pub actor: Actor,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Service timeline entry, shown to both merchant and client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEvent {
    pub id: Uuid,
    pub service_id: ServiceId,
    pub activity: Activity,
    pub summary: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideAction {
    MarkMilestonePaid,
    #[serde(rename = "COMPLETE_SERVICE_WITHOUT_FINAL_PAYMENT")]
    CompleteWithoutFinalPayment,
    #[serde(rename = "REOPEN_SERVICE")]
    Reopen,
}

impl OverrideAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkMilestonePaid => "MARK_MILESTONE_PAID",
            Self::CompleteWithoutFinalPayment => "COMPLETE_SERVICE_WITHOUT_FINAL_PAYMENT",
            Self::Reopen => "REOPEN_SERVICE",
        }
    }
}

impl fmt::Display for OverrideAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverrideAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "MARK_MILESTONE_PAID" | "MarkMilestonePaid" => Ok(Self::MarkMilestonePaid),
            "COMPLETE_SERVICE_WITHOUT_FINAL_PAYMENT" | "CompleteWithoutFinalPayment" => {
                Ok(Self::CompleteWithoutFinalPayment)
            }
            "REOPEN_SERVICE" | "Reopen" => Ok(Self::Reopen),
            other => Err(ValidationError::ActionInvalid(other.to_string())),
        }
    }
}

/// Durable record of a privileged override: who, why, what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAction {
    pub id: Uuid,
    pub service_id: ServiceId,
    pub action: OverrideAction,
    pub reason: String,
    pub actor: Actor,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_wire_names() {
        assert_eq!(
            serde_json::to_string(&Activity::MilestonePaymentRequested).unwrap(),
            "\"MILESTONE_PAYMENT_REQUESTED\""
        );
        assert_eq!(serde_json::to_string(&Actor::Webhook).unwrap(), "\"webhook\"");
    }

    #[test]
    fn test_override_action_names_round_trip() {
        for action in [
            OverrideAction::MarkMilestonePaid,
            OverrideAction::CompleteWithoutFinalPayment,
            OverrideAction::Reopen,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
            assert_eq!(action.as_str().parse::<OverrideAction>().unwrap(), action);
        }
        assert!("DELETE_SERVICE".parse::<OverrideAction>().is_err());
    }
}
