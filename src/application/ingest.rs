use super::engine::EscrowEngine;
use super::trail::Trail;
use crate::domain::audit::{Activity, Actor};
use crate::domain::calculator::calculate_amounts;
use crate::domain::ledger::{IdempotencyRecord, InsertOutcome};
use crate::domain::milestone::{Milestone, MilestoneStatus};
use crate::domain::portal::PortalToken;
use crate::domain::ports::StoreTx;
use crate::domain::service::{ClientContact, NewService, Service, ServiceStatus};
use crate::domain::shop::Shop;
use crate::domain::template::ServiceConfig;
use crate::domain::{MilestoneId, ServiceId};
use crate::error::{EscrowError, Result};
use crate::interfaces::webhook::note;
use crate::interfaces::webhook::payload::{MilestonePaidPayload, OrderPaidPayload};
use crate::interfaces::webhook::topic::Topic;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One delivery from the e-commerce platform, as received.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Origin-supplied shop identity, e.g. `demo.myshop.example`.
    pub shop_domain: String,
    pub topic: String,
    /// Delivery id, when the origin sends one.
    pub event_id: Option<String>,
    pub body: Vec<u8>,
    /// `base64(HMAC-SHA256(secret, body))`.
    pub signature: String,
}

/// What ingestion did with an authenticated event.
///
/// Every variant means "acknowledge the delivery": the origin must not retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    UnknownShop,
    AlreadyProcessed,
    ServiceBooked { service_id: ServiceId, created: bool },
    MilestonePaid { milestone_id: MilestoneId, service_completed: bool },
    ShopUninstalled,
    Ignored(IgnoreReason),
}

/// Conditions that are dropped instead of raised, so a poison message cannot
/// trigger an endless redelivery loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    MalformedPayload,
    NoServiceProduct,
    InvalidProductConfig,
    AmountCalculation,
    UnknownMilestone,
    MilestoneAlreadyPaid,
    MilestoneLocked,
    UnhandledTopic,
}

impl EscrowEngine {
    /// Authenticates, deduplicates and applies one inbound event.
    ///
    /// Only an invalid signature is reported as an error to the sender;
    /// store failures propagate as transient errors with nothing written, so
    /// a redelivery is processed from scratch.
    pub async fn ingest_event(&self, event: InboundEvent) -> Result<IngestOutcome> {
        if !self
            .verifier
            .verify(&event.body, &event.signature, &self.config.webhook_secret)
        {
            warn!(shop = %event.shop_domain, topic = %event.topic, "webhook signature rejected");
            return Err(EscrowError::Unauthorized("invalid webhook signature"));
        }

        let topic = Topic::parse(&event.topic);
        let mut tx = self.store.begin().await?;

        let Some(shop) = tx.find_shop_by_domain(&event.shop_domain).await? else {
            warn!(shop = %event.shop_domain, topic = topic.as_str(), "webhook from unknown shop dropped");
            return Ok(IngestOutcome::UnknownShop);
        };

        let now = self.clock.now();
        let record = IdempotencyRecord::new(
            shop.id,
            topic.as_str(),
            event.event_id.as_deref(),
            &event.body,
            now,
        );
        let event_id = record.key.event_id.clone();

        if tx.insert_ledger_record(record).await? == InsertOutcome::AlreadyExists {
            tx.commit().await?;
            info!(shop = %shop.domain, topic = topic.as_str(), %event_id, "webhook already processed");
            return Ok(IngestOutcome::AlreadyProcessed);
        }

        let outcome = match &topic {
            Topic::OrdersPaid => self.on_order_paid(tx.as_mut(), &shop, &event.body, now).await?,
            Topic::MilestonePaid => self.on_milestone_paid(tx.as_mut(), &shop, &event.body, now).await?,
            Topic::AppUninstalled => {
                tx.delete_shop(shop.id).await?;
                info!(shop = %shop.domain, "shop uninstalled, state removed");
                IngestOutcome::ShopUninstalled
            }
            Topic::Other(name) => {
                warn!(shop = %shop.domain, topic = %name, "unhandled webhook topic dropped");
                IngestOutcome::Ignored(IgnoreReason::UnhandledTopic)
            }
        };

        tx.commit().await?;
        debug!(shop = %shop.domain, topic = topic.as_str(), %event_id, ?outcome, "webhook processed");
        Ok(outcome)
    }

    async fn on_order_paid(
        &self,
        tx: &mut dyn StoreTx,
        shop: &Shop,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        let payload = match serde_json::from_slice::<OrderPaidPayload>(body) {
            Ok(payload) if payload.is_actionable() => payload,
            Ok(_) => return Ok(ignored(shop, IgnoreReason::MalformedPayload)),
            Err(e) => {
                warn!(shop = %shop.domain, error = %e, "orders_paid payload unreadable");
                return Ok(IgnoreReason::MalformedPayload.into());
            }
        };
        let order_id = payload.order_id();

        // Orders created from a payment request settle a milestone instead.
        if let Some(reference) = note::find_key(&payload.note, "milestone_id") {
            let Ok(milestone_id) = reference.parse::<Uuid>() else {
                return Ok(ignored(shop, IgnoreReason::UnknownMilestone));
            };
            let source = json!({ "orderId": order_id });
            return self.settle(tx, shop, milestone_id, source, now).await;
        }

        let mut product = None;
        for product_id in payload.product_ids() {
            if let Some(config) = tx.product_config(shop.id, &product_id).await? {
                product = Some(config);
                break;
            }
        }
        let Some(product) = product else {
            info!(shop = %shop.domain, %order_id, "orders_paid: no service product in order");
            return Ok(IgnoreReason::NoServiceProduct.into());
        };

        let config = match ServiceConfig::parse_and_validate(&product.config) {
            Ok(config) => config,
            Err(e) => {
                warn!(shop = %shop.domain, product_id = %product.product_id, error = %e, "orders_paid: invalid service product config");
                return Ok(IgnoreReason::InvalidProductConfig.into());
            }
        };

        let Ok(total) = payload.total_price.trim().parse::<Decimal>() else {
            return Ok(ignored(shop, IgnoreReason::MalformedPayload));
        };
        let amounts = match calculate_amounts(total, &config.templates, self.config.currency_scale) {
            Ok(amounts) => amounts,
            Err(e) => {
                warn!(shop = %shop.domain, %order_id, error = %e, "orders_paid: milestone calculation failed");
                return Ok(IgnoreReason::AmountCalculation.into());
            }
        };

        let currency = payload
            .currency()
            .or_else(|| config.currency.clone())
            .unwrap_or_else(|| self.config.default_currency.clone());

        let draft = Service::draft(
            NewService {
                shop_id: shop.id,
                order_id: order_id.clone(),
                product_id: product.product_id.clone(),
                client: ClientContact {
                    email: payload.email(),
                    name: payload.customer_name(),
                },
                total,
                currency,
                config_snapshot: config,
            },
            now,
        );

        let created = tx.insert_service(draft.clone()).await? == InsertOutcome::Inserted;
        let mut service = if created {
            draft
        } else {
            tx.service_by_order(shop.id, &order_id)
                .await?
                .ok_or_else(|| EscrowError::Store(format!("service for order {order_id} not readable")))?
        };

        let trail = Trail::new(shop.id, service.id, Actor::Webhook, now);

        if created {
            trail
                .audit(
                    tx,
                    Activity::ServiceCreated,
                    json!({ "orderId": order_id, "productId": product.product_id }),
                )
                .await?;
            trail
                .event(tx, Activity::ServiceCreated, "Service created", json!({ "orderId": order_id }))
                .await?;

            tx.insert_portal_token(PortalToken::mint(service.id, self.config.portal_token_ttl, now))
                .await?;
            trail
                .event(tx, Activity::PortalTokenCreated, "Client portal link created", json!({}))
                .await?;
        }

        for (sequence, calculated) in (0u32..).zip(amounts.iter()) {
            let milestone = Milestone::scheduled(service.id, sequence, calculated.amount, calculated.is_final, now);
            if tx.insert_milestone(milestone).await? == InsertOutcome::AlreadyExists {
                continue;
            }
            if sequence == 0 {
                trail
                    .audit(
                        tx,
                        Activity::DepositPaid,
                        json!({ "sequence": 0, "amount": calculated.amount.to_string() }),
                    )
                    .await?;
                trail
                    .event(tx, Activity::MilestonePaid, "Deposit paid", json!({ "sequence": 0 }))
                    .await?;
            }
        }

        if created {
            service.set_status(ServiceStatus::Booked, false, now);
            tx.update_service(&service).await?;
            info!(shop = %shop.domain, %order_id, service_id = %service.id, milestones = amounts.len(), "service booked");
        }

        Ok(IngestOutcome::ServiceBooked {
            service_id: service.id,
            created,
        })
    }

    async fn on_milestone_paid(
        &self,
        tx: &mut dyn StoreTx,
        shop: &Shop,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        let Ok(payload) = serde_json::from_slice::<MilestonePaidPayload>(body) else {
            return Ok(ignored(shop, IgnoreReason::MalformedPayload));
        };
        let Some(reference) = payload.reference() else {
            return Ok(ignored(shop, IgnoreReason::MalformedPayload));
        };
        let Some(milestone_id) = tx.milestone_by_payment_ref(shop.id, reference).await? else {
            return Ok(ignored(shop, IgnoreReason::UnknownMilestone));
        };

        let source = json!({ "paymentRef": reference });
        self.settle(tx, shop, milestone_id, source, now).await
    }

    /// Marks a milestone paid on the platform's word and completes the
    /// service when that was the approved final payment.
    async fn settle(
        &self,
        tx: &mut dyn StoreTx,
        shop: &Shop,
        milestone_id: MilestoneId,
        source: Value,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        let Some(mut milestone) = tx.lock_milestone(shop.id, milestone_id).await? else {
            return Ok(ignored(shop, IgnoreReason::UnknownMilestone));
        };
        match milestone.status {
            MilestoneStatus::Paid => return Ok(ignored(shop, IgnoreReason::MilestoneAlreadyPaid)),
            MilestoneStatus::Locked => {
                // Settlement ahead of approval; the unlock path collects it later.
                warn!(shop = %shop.domain, %milestone_id, "settlement for locked final milestone dropped");
                return Ok(IgnoreReason::MilestoneLocked.into());
            }
            MilestoneStatus::Unpaid => {}
        }

        milestone.mark_paid(now);
        tx.update_milestone(&milestone).await?;

        let trail = Trail::new(shop.id, milestone.service_id, Actor::Webhook, now);
        let mut metadata = source;
        if let Value::Object(map) = &mut metadata {
            map.insert("milestoneId".to_string(), json!(milestone.id));
            map.insert("sequence".to_string(), json!(milestone.sequence));
        }
        trail.audit(tx, Activity::MilestonePaid, metadata).await?;
        trail
            .event(
                tx,
                Activity::MilestonePaid,
                "Milestone paid",
                json!({ "milestoneId": milestone.id, "sequence": milestone.sequence }),
            )
            .await?;

        let service_completed = self.complete_if_final(tx, shop, &milestone, &trail, now).await?;
        info!(shop = %shop.domain, %milestone_id, service_completed, "milestone settled");

        Ok(IngestOutcome::MilestonePaid {
            milestone_id,
            service_completed,
        })
    }

    async fn complete_if_final(
        &self,
        tx: &mut dyn StoreTx,
        shop: &Shop,
        milestone: &Milestone,
        trail: &Trail,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let milestones = tx.milestones_for_service(milestone.service_id).await?;
        let is_final = milestones.last().is_some_and(|m| m.sequence == milestone.sequence);
        if !is_final {
            return Ok(false);
        }

        let approved = tx
            .lock_approval(milestone.service_id)
            .await?
            .is_some_and(|a| a.approved);
        if !approved {
            return Ok(false);
        }

        let Some(mut service) = tx.lock_service(shop.id, milestone.service_id).await? else {
            return Ok(false);
        };
        if service.status == ServiceStatus::Completed {
            return Ok(false);
        }

        service.set_status(ServiceStatus::Completed, false, now);
        tx.update_service(&service).await?;
        trail
            .event(
                tx,
                Activity::StatusChanged,
                "Service completed",
                json!({ "to": ServiceStatus::Completed }),
            )
            .await?;
        Ok(true)
    }
}

impl From<IgnoreReason> for IngestOutcome {
    fn from(reason: IgnoreReason) -> Self {
        Self::Ignored(reason)
    }
}

fn ignored(shop: &Shop, reason: IgnoreReason) -> IngestOutcome {
    debug!(shop = %shop.domain, ?reason, "webhook ignored");
    IngestOutcome::Ignored(reason)
}
