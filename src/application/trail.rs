use crate::domain::audit::{Activity, Actor, AuditEntry, ServiceEvent};
use crate::domain::ports::StoreTx;
use crate::domain::{ServiceId, ShopId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Writes audit entries and timeline events for one service and actor.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Trail {
    shop_id: ShopId,
    service_id: ServiceId,
    actor: Actor,
    at: DateTime<Utc>,
}

impl Trail {
    pub(crate) fn new(shop_id: ShopId, service_id: ServiceId, actor: Actor, at: DateTime<Utc>) -> Self {
        Self {
            shop_id,
            service_id,
            actor,
            at,
        }
    }

    pub(crate) async fn audit(&self, tx: &mut dyn StoreTx, activity: Activity, metadata: Value) -> Result<()> {
        tx.append_audit(AuditEntry {
            id: Uuid::new_v4(),
            shop_id: self.shop_id,
            service_id: Some(self.service_id),
            activity,
            actor: self.actor,
            metadata,
            created_at: self.at,
        })
        .await
    }

    pub(crate) async fn event(
        &self,
        tx: &mut dyn StoreTx,
        activity: Activity,
        summary: &str,
        data: Value,
    ) -> Result<()> {
        tx.append_event(ServiceEvent {
            id: Uuid::new_v4(),
            service_id: self.service_id,
            activity,
            summary: summary.to_string(),
            actor: self.actor,
            occurred_at: self.at,
            data,
        })
        .await
    }

    /// Audit entry and timeline event carrying the same metadata.
    pub(crate) async fn record(
        &self,
        tx: &mut dyn StoreTx,
        activity: Activity,
        summary: &str,
        metadata: Value,
    ) -> Result<()> {
        self.audit(tx, activity, metadata.clone()).await?;
        self.event(tx, activity, summary, metadata).await
    }
}
