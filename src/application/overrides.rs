use super::engine::EscrowEngine;
use super::trail::Trail;
use crate::domain::audit::{Activity, Actor, AdminAction, OverrideAction};
use crate::domain::milestone::Milestone;
use crate::domain::service::{Service, ServiceStatus};
use crate::domain::{MilestoneId, ServiceId, ShopId};
use crate::error::{ConflictError, EscrowError, Result, ValidationError};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

/// A privileged bypass of the normal lifecycle guards.
#[derive(Debug, Clone)]
pub struct OverrideRequest {
    pub action: OverrideAction,
    pub reason: String,
    /// Required for [`OverrideAction::MarkMilestonePaid`].
    pub milestone_id: Option<MilestoneId>,
}

/// A validated override, holding the rows it will change.
enum Effect {
    MarkPaid(Milestone),
    Complete,
    Reopen,
}

impl EscrowEngine {
    /// Applies an administrative override.
    ///
    /// The admin action is recorded before its effect, in the same
    /// transaction, so an override is never applied without its reason.
    pub async fn admin_override(
        &self,
        shop_id: ShopId,
        service_id: ServiceId,
        request: OverrideRequest,
    ) -> Result<Service> {
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::OverrideReasonRequired.into());
        }

        let mut tx = self.store.begin().await?;
        let mut service = tx
            .lock_service(shop_id, service_id)
            .await?
            .ok_or(EscrowError::NotFound("service"))?;

        let effect = match request.action {
            OverrideAction::MarkMilestonePaid => {
                let milestone_id = request
                    .milestone_id
                    .ok_or(ValidationError::MilestoneRequired(OverrideAction::MarkMilestonePaid.as_str()))?;
                let milestone = tx
                    .lock_milestone(shop_id, milestone_id)
                    .await?
                    .filter(|m| m.service_id == service_id)
                    .ok_or(EscrowError::NotFound("milestone"))?;
                if milestone.is_paid() {
                    return Err(ConflictError::AlreadyPaid.into());
                }
                Effect::MarkPaid(milestone)
            }
            OverrideAction::CompleteWithoutFinalPayment => Effect::Complete,
            OverrideAction::Reopen if service.status != ServiceStatus::Completed => {
                return Err(ConflictError::InvalidStateTransition {
                    from: service.status,
                    to: ServiceStatus::InProgress,
                }
                .into());
            }
            OverrideAction::Reopen => Effect::Reopen,
        };

        let now = self.clock.now();
        let metadata = json!({
            "actionType": request.action,
            "reason": reason,
            "milestoneId": request.milestone_id,
        });

        tx.append_admin_action(AdminAction {
            id: Uuid::new_v4(),
            service_id,
            action: request.action,
            reason: reason.to_string(),
            actor: Actor::Merchant,
            metadata: json!({ "milestoneId": request.milestone_id }),
            created_at: now,
        })
        .await?;

        match effect {
            Effect::MarkPaid(mut milestone) => {
                milestone.mark_paid(now);
                tx.update_milestone(&milestone).await?;
            }
            Effect::Complete => {
                service.set_status(ServiceStatus::Completed, true, now);
                tx.update_service(&service).await?;
            }
            Effect::Reopen => {
                service.set_status(ServiceStatus::InProgress, false, now);
                tx.update_service(&service).await?;
            }
        }

        Trail::new(shop_id, service_id, Actor::Merchant, now)
            .record(tx.as_mut(), Activity::AdminOverride, "Admin override applied", metadata)
            .await?;

        tx.commit().await?;
        warn!(%shop_id, %service_id, action = %request.action, reason, "admin override applied");
        Ok(service)
    }
}
