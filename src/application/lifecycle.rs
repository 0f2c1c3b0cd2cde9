use super::engine::EscrowEngine;
use super::trail::Trail;
use crate::domain::approval::Approval;
use crate::domain::audit::{Activity, Actor};
use crate::domain::deliverable::{Deliverable, DeliverableKind};
use crate::domain::milestone::Milestone;
use crate::domain::ports::StoreTx;
use crate::domain::service::{Service, ServiceStatus, can_transition};
use crate::domain::{ServiceId, ShopId};
use crate::error::{ConflictError, EscrowError, Result, ValidationError};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Approve,
    RequestRevision,
}

impl EscrowEngine {
    /// Moves a service along the merchant-driven part of its lifecycle.
    ///
    /// Completing requires the final milestone to be paid. Entering
    /// `WaitingForApproval` snapshots whether a preview exists and opens (or
    /// refreshes) the approval record.
    pub async fn change_status(
        &self,
        shop_id: ShopId,
        service_id: ServiceId,
        next: ServiceStatus,
    ) -> Result<Service> {
        let mut tx = self.store.begin().await?;
        let mut service = tx
            .lock_service(shop_id, service_id)
            .await?
            .ok_or(EscrowError::NotFound("service"))?;
        let from = service.status;

        if next == ServiceStatus::Completed && !service.completed_via_override {
            let final_paid = tx
                .milestones_for_service(service_id)
                .await?
                .last()
                .is_some_and(Milestone::is_paid);
            if !final_paid {
                return Err(ConflictError::FinalMilestoneLocked.into());
            }
        }

        if !can_transition(from, next) {
            return Err(ConflictError::InvalidStateTransition { from, to: next }.into());
        }

        let now = self.clock.now();
        if next == ServiceStatus::WaitingForApproval {
            let has_preview = tx.has_preview(service_id).await?;
            let approval = match tx.lock_approval(service_id).await? {
                Some(mut approval) => {
                    approval.rerequest(has_preview, now);
                    approval
                }
                None => Approval::requested(service_id, has_preview, now),
            };
            tx.upsert_approval(&approval).await?;
        }

        service.set_status(next, service.completed_via_override, now);
        tx.update_service(&service).await?;

        Trail::new(shop_id, service_id, Actor::Merchant, now)
            .record(
                tx.as_mut(),
                Activity::StatusChanged,
                "Status changed",
                json!({ "from": from, "to": next }),
            )
            .await?;

        tx.commit().await?;
        info!(%shop_id, %service_id, %from, to = %next, "service status changed");
        Ok(service)
    }

    /// Client sign-off. Unlocks the final milestone; the status stays
    /// `WaitingForApproval` until that milestone is paid.
    pub async fn approve(&self, service_id: ServiceId, note: Option<String>) -> Result<()> {
        let mut tx = self.store.begin().await?;
        self.decide(tx.as_mut(), service_id, Decision::Approve, note).await?;
        tx.commit().await
    }

    /// Client rejection. Sends the service back to `InProgress`.
    pub async fn request_revision(&self, service_id: ServiceId, note: Option<String>) -> Result<()> {
        let mut tx = self.store.begin().await?;
        self.decide(tx.as_mut(), service_id, Decision::RequestRevision, note)
            .await?;
        tx.commit().await
    }

    pub async fn approve_via_portal(&self, token: &str, note: Option<String>) -> Result<()> {
        self.decide_via_portal(token, Decision::Approve, note).await
    }

    pub async fn request_revision_via_portal(&self, token: &str, note: Option<String>) -> Result<()> {
        self.decide_via_portal(token, Decision::RequestRevision, note)
            .await
    }

    async fn decide_via_portal(&self, token: &str, decision: Decision, note: Option<String>) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let now = self.clock.now();
        // The token row stays locked so two clicks on the same link serialize.
        let token = tx
            .lock_portal_token(token.trim())
            .await?
            .filter(|t| t.is_active(now))
            .ok_or(EscrowError::NotFound("portal link"))?;

        self.decide(tx.as_mut(), token.service_id, decision, note)
            .await?;
        tx.commit().await
    }

    async fn decide(
        &self,
        tx: &mut dyn StoreTx,
        service_id: ServiceId,
        decision: Decision,
        note: Option<String>,
    ) -> Result<()> {
        let mut service = tx
            .lock_service_any(service_id)
            .await?
            .ok_or(EscrowError::NotFound("service"))?;

        if service.status != ServiceStatus::WaitingForApproval {
            let to = match decision {
                // Approval is the gate into completion.
                Decision::Approve => ServiceStatus::Completed,
                Decision::RequestRevision => ServiceStatus::InProgress,
            };
            return Err(ConflictError::InvalidStateTransition {
                from: service.status,
                to,
            }
            .into());
        }

        let now = self.clock.now();
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let mut approval = tx
            .lock_approval(service_id)
            .await?
            .unwrap_or_else(|| Approval::requested(service_id, false, now));
        let trail = Trail::new(service.shop_id, service_id, Actor::Client, now);

        match decision {
            Decision::Approve => {
                approval.approve(note.clone(), now);
                tx.upsert_approval(&approval).await?;

                let milestones = tx.milestones_for_service(service_id).await?;
                if let Some(mut last) = milestones.into_iter().last()
                    && last.unlock()
                {
                    tx.update_milestone(&last).await?;
                }

                trail
                    .record(tx, Activity::Approved, "Client approved", json!({ "note": note }))
                    .await?;
                info!(%service_id, "client approved");
            }
            Decision::RequestRevision => {
                approval.request_revision(note.clone(), now);
                tx.upsert_approval(&approval).await?;

                service.set_status(ServiceStatus::InProgress, false, now);
                tx.update_service(&service).await?;

                trail
                    .record(
                        tx,
                        Activity::RevisionRequested,
                        "Client requested revision",
                        json!({ "note": note }),
                    )
                    .await?;
                info!(%service_id, "client requested revision");
            }
        }

        Ok(())
    }

    /// Attaches a file to a service. Preview deliverables feed the snapshot
    /// taken when approval is requested.
    pub async fn add_deliverable(
        &self,
        shop_id: ShopId,
        service_id: ServiceId,
        kind: DeliverableKind,
        url: &str,
        uploaded_by: Actor,
    ) -> Result<Deliverable> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ValidationError::Required("deliverable url").into());
        }

        let mut tx = self.store.begin().await?;
        tx.lock_service(shop_id, service_id)
            .await?
            .ok_or(EscrowError::NotFound("service"))?;

        let now = self.clock.now();
        let deliverable = Deliverable {
            id: Uuid::new_v4(),
            service_id,
            kind,
            url: url.to_string(),
            uploaded_by,
            created_at: now,
        };
        tx.insert_deliverable(deliverable.clone()).await?;

        Trail::new(shop_id, service_id, uploaded_by, now)
            .record(
                tx.as_mut(),
                Activity::DeliverableAdded,
                "Deliverable added",
                json!({ "deliverableId": deliverable.id, "kind": kind, "url": deliverable.url }),
            )
            .await?;

        tx.commit().await?;
        Ok(deliverable)
    }
}
