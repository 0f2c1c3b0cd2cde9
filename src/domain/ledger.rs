use super::ShopId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of one inbound delivery: at most one is ever processed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub shop_id: ShopId,
    pub topic: String,
    pub event_id: String,
}

/// Write-once record of a processed inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: LedgerKey,
    pub payload_hash: String,
    pub processed_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// When the origin supplies no delivery id the payload hash stands in,
    /// so identical replays still collide.
    pub fn new(
        shop_id: ShopId,
        topic: &str,
        event_id: Option<&str>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Self {
        let payload_hash = payload_hash(body);
        let event_id = event_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map_or_else(|| payload_hash.clone(), str::to_string);

        Self {
            key: LedgerKey {
                shop_id,
                topic: topic.to_string(),
                event_id,
            },
            payload_hash,
            processed_at: now,
        }
    }
}

/// Result of an insert guarded by a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

pub fn payload_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}
