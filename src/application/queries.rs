use super::engine::{EscrowEngine, require_shop};
use crate::domain::approval::Approval;
use crate::domain::audit::{AdminAction, AuditEntry, ServiceEvent};
use crate::domain::milestone::Milestone;
use crate::domain::portal::PortalToken;
use crate::domain::ports::StoreTx;
use crate::domain::service::Service;
use crate::domain::{ServiceId, ShopId};
use crate::error::{EscrowError, Result};
use rust_decimal::Decimal;
use serde::Serialize;

/// A service as listed for the merchant.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSummary {
    pub service: Service,
    /// Sum of the milestones already paid.
    pub paid_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceDetail {
    pub service: Service,
    pub milestones: Vec<Milestone>,
    pub approval: Option<Approval>,
    pub portal_token: Option<PortalToken>,
    pub admin_actions: Vec<AdminAction>,
}

/// What the client sees behind a portal link.
#[derive(Debug, Clone, Serialize)]
pub struct PortalView {
    pub service: Service,
    pub milestones: Vec<Milestone>,
    pub approval: Option<Approval>,
}

// Reads run in their own lock-free transaction and are dropped without committing.
impl EscrowEngine {
    /// Newest first.
    pub async fn list_services(&self, shop_id: ShopId) -> Result<Vec<ServiceSummary>> {
        let mut tx = self.store.begin().await?;
        require_shop(tx.as_mut(), shop_id).await?;

        let mut summaries = Vec::new();
        for service in tx.services_for_shop(shop_id).await? {
            let paid_amount = tx
                .milestones_for_service(service.id)
                .await?
                .iter()
                .filter(|m| m.is_paid())
                .map(|m| m.amount)
                .sum();
            summaries.push(ServiceSummary { service, paid_amount });
        }
        Ok(summaries)
    }

    pub async fn service_detail(&self, shop_id: ShopId, service_id: ServiceId) -> Result<ServiceDetail> {
        let mut tx = self.store.begin().await?;
        let service = scoped_service(tx.as_mut(), shop_id, service_id).await?;
        let now = self.clock.now();

        Ok(ServiceDetail {
            milestones: tx.milestones_for_service(service_id).await?,
            approval: tx.find_approval(service_id).await?,
            portal_token: tx.active_portal_token(service_id, now).await?,
            admin_actions: tx.admin_actions_for_service(service_id).await?,
            service,
        })
    }

    pub async fn find_service_by_order(&self, shop_id: ShopId, order_id: &str) -> Result<Option<Service>> {
        let mut tx = self.store.begin().await?;
        tx.service_by_order(shop_id, order_id.trim()).await
    }

    /// The service timeline, oldest first.
    pub async fn service_events(&self, shop_id: ShopId, service_id: ServiceId) -> Result<Vec<ServiceEvent>> {
        let mut tx = self.store.begin().await?;
        scoped_service(tx.as_mut(), shop_id, service_id).await?;
        tx.events_for_service(service_id).await
    }

    pub async fn shop_audit(&self, shop_id: ShopId) -> Result<Vec<AuditEntry>> {
        let mut tx = self.store.begin().await?;
        tx.audit_for_shop(shop_id).await
    }

    pub async fn portal_view(&self, token: &str) -> Result<PortalView> {
        let mut tx = self.store.begin().await?;
        let service_id = self.portal_service(tx.as_mut(), token).await?;
        let service = tx
            .find_service(service_id)
            .await?
            .ok_or(EscrowError::NotFound("service"))?;

        Ok(PortalView {
            milestones: tx.milestones_for_service(service_id).await?,
            approval: tx.find_approval(service_id).await?,
            service,
        })
    }

    pub async fn portal_events(&self, token: &str) -> Result<Vec<ServiceEvent>> {
        let mut tx = self.store.begin().await?;
        let service_id = self.portal_service(tx.as_mut(), token).await?;
        tx.events_for_service(service_id).await
    }

    async fn portal_service(&self, tx: &mut dyn StoreTx, token: &str) -> Result<ServiceId> {
        let now = self.clock.now();
        tx.find_portal_token(token.trim())
            .await?
            .filter(|t| t.is_active(now))
            .map(|t| t.service_id)
            .ok_or(EscrowError::NotFound("portal link"))
    }
}

async fn scoped_service(tx: &mut dyn StoreTx, shop_id: ShopId, service_id: ServiceId) -> Result<Service> {
    tx.find_service(service_id)
        .await?
        .filter(|s| s.shop_id == shop_id)
        .ok_or(EscrowError::NotFound("service"))
}
