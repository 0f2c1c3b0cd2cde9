use super::ServiceId;
use super::audit::Actor;
use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliverableKind {
    Preview,
    Deliverable,
    Other,
}

impl FromStr for DeliverableKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preview" => Ok(Self::Preview),
            "deliverable" => Ok(Self::Deliverable),
            "other" => Ok(Self::Other),
            other => Err(ValidationError::DeliverableKindInvalid(other.to_string())),
        }
    }
}

/// A file attached to a service by the merchant or the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: Uuid,
    pub service_id: ServiceId,
    pub kind: DeliverableKind,
    pub url: String,
    pub uploaded_by: Actor,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parses_case_insensitively() {
        assert_eq!(" Preview ".parse::<DeliverableKind>().unwrap(), DeliverableKind::Preview);
        assert_eq!("DELIVERABLE".parse::<DeliverableKind>().unwrap(), DeliverableKind::Deliverable);
        assert!(matches!(
            "draft".parse::<DeliverableKind>(),
            Err(ValidationError::DeliverableKindInvalid(k)) if k == "draft"
        ));
    }
}
