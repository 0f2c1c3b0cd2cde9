//! Scenario files for the simulation CLI: shops to seed and a list of steps
//! replayed against the engine.

use crate::application::engine::EscrowEngine;
use crate::application::ingest::{InboundEvent, IngestOutcome};
use crate::application::overrides::OverrideRequest;
use crate::domain::audit::{Actor, OverrideAction};
use crate::domain::deliverable::DeliverableKind;
use crate::domain::milestone::Milestone;
use crate::domain::service::{Service, ServiceStatus};
use crate::domain::shop::Shop;
use crate::error::{EscrowError, Result};
use crate::infrastructure::hmac::sign;
use crate::interfaces::csv::milestone_writer::MilestoneRow;
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub shops: Vec<ShopSeed>,
    /// Kept raw so one malformed step does not reject the whole file.
    #[serde(default)]
    steps: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShopSeed {
    pub domain: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductSeed {
    pub product_id: String,
    pub config: Value,
}

/// One scripted action. Services are addressed by their order id and
/// milestones by sequence, the way they appear in the report.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// A platform delivery. Signed with the engine secret unless `signature`
    /// is given.
    Webhook {
        shop: String,
        topic: String,
        #[serde(default)]
        event_id: Option<String>,
        body: Value,
        #[serde(default)]
        signature: Option<String>,
    },
    Status {
        shop: String,
        order: String,
        to: String,
    },
    Deliverable {
        shop: String,
        order: String,
        kind: String,
        url: String,
    },
    Approve {
        shop: String,
        order: String,
        #[serde(default)]
        note: Option<String>,
    },
    RequestRevision {
        shop: String,
        order: String,
        #[serde(default)]
        note: Option<String>,
    },
    RequestPayment {
        shop: String,
        order: String,
        sequence: u32,
    },
    /// The platform reports a requested milestone payment as collected.
    Settle {
        shop: String,
        order: String,
        sequence: u32,
    },
    Override {
        shop: String,
        order: String,
        #[serde(rename = "type")]
        action: String,
        #[serde(default)]
        reason: String,
        #[serde(default)]
        sequence: Option<u32>,
    },
}

impl Scenario {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        Ok(serde_json::from_reader(source)?)
    }

    /// Lazily decodes the steps in file order.
    pub fn steps(&self) -> impl Iterator<Item = Result<Step>> + '_ {
        self.steps
            .iter()
            .map(|raw| Step::deserialize(raw).map_err(EscrowError::from))
    }
}

/// Drives an engine through a scenario.
pub struct ScenarioRunner<'a> {
    engine: &'a EscrowEngine,
    shops: Vec<Shop>,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(engine: &'a EscrowEngine) -> Self {
        Self {
            engine,
            shops: Vec::new(),
        }
    }

    /// Installs the scenario's shops and their service products.
    pub async fn seed(&mut self, seeds: &[ShopSeed]) -> Result<()> {
        for seed in seeds {
            let shop = self.engine.install_shop(&seed.domain, &seed.access_token).await?;
            for product in &seed.products {
                self.engine
                    .configure_product(shop.id, &product.product_id, product.config.clone())
                    .await?;
            }
            self.shops.push(shop);
        }
        Ok(())
    }

    pub async fn apply(&self, step: Step) -> Result<()> {
        debug!(?step, "applying step");
        match step {
            Step::Webhook {
                shop,
                topic,
                event_id,
                body,
                signature,
            } => {
                let body = serde_json::to_vec(&body)?;
                let signature = signature.unwrap_or_else(|| sign(&body, &self.engine.config().webhook_secret));
                let outcome = self
                    .engine
                    .ingest_event(InboundEvent {
                        shop_domain: shop,
                        topic,
                        event_id,
                        body,
                        signature,
                    })
                    .await?;
                debug!(?outcome, "webhook ingested");
            }
            Step::Status { shop, order, to } => {
                let next: ServiceStatus = to.parse()?;
                let (shop, service) = self.service(&shop, &order).await?;
                self.engine.change_status(shop.id, service.id, next).await?;
            }
            Step::Deliverable { shop, order, kind, url } => {
                let kind: DeliverableKind = kind.parse()?;
                let (shop, service) = self.service(&shop, &order).await?;
                self.engine
                    .add_deliverable(shop.id, service.id, kind, &url, Actor::Merchant)
                    .await?;
            }
            Step::Approve { shop, order, note } => {
                let (_, service) = self.service(&shop, &order).await?;
                self.engine.approve(service.id, note).await?;
            }
            Step::RequestRevision { shop, order, note } => {
                let (_, service) = self.service(&shop, &order).await?;
                self.engine.request_revision(service.id, note).await?;
            }
            Step::RequestPayment { shop, order, sequence } => {
                let (shop, milestone) = self.milestone(&shop, &order, sequence).await?;
                self.engine.request_payment(shop.id, milestone.id).await?;
            }
            Step::Settle { shop, order, sequence } => {
                let (shop, milestone) = self.milestone(&shop, &order, sequence).await?;
                let reference = milestone
                    .payment
                    .map(|p| p.reference)
                    .ok_or(EscrowError::NotFound("payment request"))?;
                let body = serde_json::to_vec(&serde_json::json!({ "draft_order_id": reference }))?;
                let outcome = self
                    .engine
                    .ingest_event(InboundEvent {
                        shop_domain: shop.domain.clone(),
                        topic: "milestone_paid".to_string(),
                        event_id: None,
                        signature: sign(&body, &self.engine.config().webhook_secret),
                        body,
                    })
                    .await?;
                if let IngestOutcome::Ignored(reason) = outcome {
                    debug!(?reason, "settlement ignored");
                }
            }
            Step::Override {
                shop,
                order,
                action,
                reason,
                sequence,
            } => {
                let action: OverrideAction = action.parse()?;
                let (shop, service) = self.service(&shop, &order).await?;
                let milestone_id = match sequence {
                    Some(sequence) => Some(self.milestone(&shop.domain, &order, sequence).await?.1.id),
                    None => None,
                };
                self.engine
                    .admin_override(
                        shop.id,
                        service.id,
                        OverrideRequest {
                            action,
                            reason,
                            milestone_id,
                        },
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// One row per milestone of every service of every seeded shop that is
    /// still installed, ordered by shop, order id and sequence.
    pub async fn report(&self) -> Result<Vec<MilestoneRow>> {
        let mut rows = Vec::new();
        for shop in &self.shops {
            let services = match self.engine.list_services(shop.id).await {
                Ok(services) => services,
                Err(EscrowError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            let mut services: Vec<Service> = services.into_iter().map(|s| s.service).collect();
            services.sort_by(|a, b| a.order_id.cmp(&b.order_id));

            for service in services {
                let detail = self.engine.service_detail(shop.id, service.id).await?;
                rows.extend(
                    detail
                        .milestones
                        .iter()
                        .map(|m| MilestoneRow::new(&shop.domain, &detail.service, m)),
                );
            }
        }
        Ok(rows)
    }

    fn shop(&self, domain: &str) -> Result<&Shop> {
        let domain = domain.trim().to_ascii_lowercase();
        self.shops
            .iter()
            .find(|s| s.domain == domain)
            .ok_or(EscrowError::NotFound("shop"))
    }

    async fn service(&self, domain: &str, order: &str) -> Result<(Shop, Service)> {
        let shop = self.shop(domain)?.clone();
        let service = self
            .engine
            .find_service_by_order(shop.id, order)
            .await?
            .ok_or(EscrowError::NotFound("service"))?;
        Ok((shop, service))
    }

    async fn milestone(&self, domain: &str, order: &str, sequence: u32) -> Result<(Shop, Milestone)> {
        let (shop, service) = self.service(domain, order).await?;
        let milestone = self
            .engine
            .service_detail(shop.id, service.id)
            .await?
            .milestones
            .into_iter()
            .find(|m| m.sequence == sequence)
            .ok_or(EscrowError::NotFound("milestone"))?;
        Ok((shop, milestone))
    }
}

