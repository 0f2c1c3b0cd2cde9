use super::ShopId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A merchant store that installed the app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    pub id: ShopId,
    pub domain: String,
    pub access_token: String,
    pub installed_at: DateTime<Utc>,
}

impl Shop {
    pub fn new(domain: &str, access_token: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain: domain.trim().to_ascii_lowercase(),
            access_token: access_token.to_string(),
            installed_at: now,
        }
    }
}

/// Raw service configuration attached to one of a shop's products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductConfig {
    pub shop_id: ShopId,
    pub product_id: String,
    pub config: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
