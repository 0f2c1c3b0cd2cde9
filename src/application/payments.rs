use super::engine::{EscrowEngine, require_shop};
use super::trail::Trail;
use crate::domain::audit::{Activity, Actor};
use crate::domain::milestone::{MilestoneStatus, PaymentLink};
use crate::domain::ports::PaymentRequest;
use crate::domain::{MilestoneId, ShopId};
use crate::error::{ConflictError, EscrowError, Result};
use crate::interfaces::webhook::note::payment_note;
use serde_json::json;
use tracing::{debug, info};

impl EscrowEngine {
    /// Asks the payment platform to collect one milestone.
    ///
    /// The milestone row stays locked for the whole call, including the
    /// platform round-trip, so concurrent callers serialize and the loser
    /// sees the winner's link. An existing link is returned unchanged; a
    /// platform failure aborts with nothing persisted.
    pub async fn request_payment(&self, shop_id: ShopId, milestone_id: MilestoneId) -> Result<PaymentLink> {
        let mut tx = self.store.begin().await?;
        let shop = require_shop(tx.as_mut(), shop_id).await?;

        let mut milestone = tx
            .lock_milestone(shop_id, milestone_id)
            .await?
            .ok_or(EscrowError::NotFound("milestone"))?;

        match milestone.status {
            MilestoneStatus::Paid => return Err(ConflictError::AlreadyPaid.into()),
            MilestoneStatus::Locked => return Err(ConflictError::Locked.into()),
            MilestoneStatus::Unpaid => {}
        }

        if let Some(link) = milestone.payment.clone() {
            debug!(%milestone_id, reference = %link.reference, "payment already requested");
            return Ok(link);
        }

        let milestones = tx.milestones_for_service(milestone.service_id).await?;
        let is_final = milestones.last().is_some_and(|m| m.id == milestone.id);
        if is_final {
            let approved = tx
                .lock_approval(milestone.service_id)
                .await?
                .is_some_and(|a| a.approved);
            if !approved {
                return Err(ConflictError::FinalMilestoneLocked.into());
            }
        }

        let service = tx
            .lock_service(shop_id, milestone.service_id)
            .await?
            .ok_or(EscrowError::NotFound("service"))?;

        let request = PaymentRequest {
            title: format!("Milestone payment (service {}, seq {})", service.id, milestone.sequence),
            amount: milestone.amount,
            currency: service.currency.clone(),
            note: payment_note(&milestone.id.to_string(), &service.id.to_string()),
        };
        let link = self.platform.create_payment_request(&shop, request).await?;

        milestone.payment = Some(link.clone());
        tx.update_milestone(&milestone).await?;

        let trail = Trail::new(shop_id, service.id, Actor::Merchant, self.clock.now());
        trail
            .record(
                tx.as_mut(),
                Activity::MilestonePaymentRequested,
                "Milestone payment requested",
                json!({
                    "milestoneId": milestone.id,
                    "sequence": milestone.sequence,
                    "paymentRef": link.reference,
                }),
            )
            .await?;

        tx.commit().await?;
        info!(shop = %shop.domain, %milestone_id, reference = %link.reference, "payment requested");
        Ok(link)
    }
}
