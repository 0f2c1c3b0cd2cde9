use super::template::ServiceConfig;
use super::{ServiceId, ShopId};
use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceStatus {
    Draft,
    Booked,
    InProgress,
    WaitingForApproval,
    Completed,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Booked => "Booked",
            Self::InProgress => "InProgress",
            Self::WaitingForApproval => "WaitingForApproval",
            Self::Completed => "Completed",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Draft" => Ok(Self::Draft),
            "Booked" => Ok(Self::Booked),
            "InProgress" => Ok(Self::InProgress),
            "WaitingForApproval" => Ok(Self::WaitingForApproval),
            "Completed" => Ok(Self::Completed),
            other => Err(ValidationError::StatusInvalid(other.to_string())),
        }
    }
}

/// The normal lifecycle allow-list. `Completed` has no way out here; only an
/// administrative override can reopen it.
pub fn can_transition(from: ServiceStatus, to: ServiceStatus) -> bool {
    use ServiceStatus::*;

    matches!(
        (from, to),
        (Draft, Booked)
            | (Booked, InProgress)
            | (InProgress, WaitingForApproval)
            | (WaitingForApproval, Completed)
            | (WaitingForApproval, InProgress)
    )
}

/// Buyer details captured from the paid order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientContact {
    pub email: Option<String>,
    pub name: Option<String>,
}

/// One escrow engagement, created once per (shop, external order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub shop_id: ShopId,
    pub order_id: String,
    pub product_id: String,
    pub client: ClientContact,
    pub total: Decimal,
    pub currency: String,
    pub status: ServiceStatus,
    /// Product configuration as it was when the order was paid.
    pub config_snapshot: ServiceConfig,
    pub completed_via_override: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewService {
    pub shop_id: ShopId,
    pub order_id: String,
    pub product_id: String,
    pub client: ClientContact,
    pub total: Decimal,
    pub currency: String,
    pub config_snapshot: ServiceConfig,
}

impl Service {
    pub fn draft(new: NewService, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            shop_id: new.shop_id,
            order_id: new.order_id,
            product_id: new.product_id,
            client: new.client,
            total: new.total,
            currency: new.currency,
            status: ServiceStatus::Draft,
            config_snapshot: new.config_snapshot,
            completed_via_override: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, next: ServiceStatus, completed_via_override: bool, now: DateTime<Utc>) {
        self.status = next;
        self.completed_via_override = completed_via_override;
        self.updated_at = now;
    }
}
