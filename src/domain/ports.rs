use super::approval::Approval;
use super::audit::{AdminAction, AuditEntry, ServiceEvent};
use super::deliverable::Deliverable;
use super::ledger::{IdempotencyRecord, InsertOutcome};
use super::milestone::{Milestone, PaymentLink};
use super::portal::PortalToken;
use super::service::Service;
use super::shop::{ProductConfig, Shop};
use super::{MilestoneId, ServiceId, ShopId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// A transactional store with row locking and unique constraints.
///
/// Everything done through one [`StoreTx`] becomes visible atomically on
/// [`StoreTx::commit`]; dropping a transaction without committing rolls it
/// back.
#[async_trait]
pub trait EscrowStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

/// One unit of work against the store.
///
/// `lock_*` and `update_*` methods hold the row for the rest of the
/// transaction; `find_*` and list reads take no lock. `insert_*` methods
/// returning [`InsertOutcome`] report a uniqueness collision as
/// `AlreadyExists` instead of failing.
#[async_trait]
pub trait StoreTx: Send {
    // shops
    async fn upsert_shop(&mut self, shop: Shop) -> Result<Shop>;
    async fn find_shop_by_domain(&mut self, domain: &str) -> Result<Option<Shop>>;
    async fn find_shop(&mut self, shop_id: ShopId) -> Result<Option<Shop>>;
    /// Removes the shop and everything it owns.
    async fn delete_shop(&mut self, shop_id: ShopId) -> Result<()>;
    async fn upsert_product_config(&mut self, config: ProductConfig) -> Result<()>;
    async fn product_config(&mut self, shop_id: ShopId, product_id: &str) -> Result<Option<ProductConfig>>;

    // idempotency ledger, unique on (shop, topic, event id)
    async fn insert_ledger_record(&mut self, record: IdempotencyRecord) -> Result<InsertOutcome>;

    // services, unique on (shop, order id)
    async fn insert_service(&mut self, service: Service) -> Result<InsertOutcome>;
    async fn service_by_order(&mut self, shop_id: ShopId, order_id: &str) -> Result<Option<Service>>;
    async fn services_for_shop(&mut self, shop_id: ShopId) -> Result<Vec<Service>>;
    async fn find_service(&mut self, service_id: ServiceId) -> Result<Option<Service>>;
    async fn lock_service(&mut self, shop_id: ShopId, service_id: ServiceId) -> Result<Option<Service>>;
    /// Unscoped lock, for callers authenticated by portal token rather than shop.
    async fn lock_service_any(&mut self, service_id: ServiceId) -> Result<Option<Service>>;
    async fn update_service(&mut self, service: &Service) -> Result<()>;

    // milestones, unique on (service, sequence)
    async fn insert_milestone(&mut self, milestone: Milestone) -> Result<InsertOutcome>;
    /// Locks a milestone only if its service belongs to `shop_id`.
    async fn lock_milestone(&mut self, shop_id: ShopId, milestone_id: MilestoneId) -> Result<Option<Milestone>>;
    async fn milestone_by_payment_ref(&mut self, shop_id: ShopId, reference: &str) -> Result<Option<MilestoneId>>;
    /// Ordered by sequence.
    async fn milestones_for_service(&mut self, service_id: ServiceId) -> Result<Vec<Milestone>>;
    async fn update_milestone(&mut self, milestone: &Milestone) -> Result<()>;

    // approval gate, one row per service
    async fn find_approval(&mut self, service_id: ServiceId) -> Result<Option<Approval>>;
    async fn lock_approval(&mut self, service_id: ServiceId) -> Result<Option<Approval>>;
    async fn upsert_approval(&mut self, approval: &Approval) -> Result<()>;

    async fn insert_deliverable(&mut self, deliverable: Deliverable) -> Result<()>;
    async fn has_preview(&mut self, service_id: ServiceId) -> Result<bool>;

    async fn insert_portal_token(&mut self, token: PortalToken) -> Result<()>;
    async fn find_portal_token(&mut self, token: &str) -> Result<Option<PortalToken>>;
    async fn lock_portal_token(&mut self, token: &str) -> Result<Option<PortalToken>>;
    async fn active_portal_token(&mut self, service_id: ServiceId, now: DateTime<Utc>) -> Result<Option<PortalToken>>;

    // trail, append-only
    async fn append_audit(&mut self, entry: AuditEntry) -> Result<()>;
    async fn append_event(&mut self, event: ServiceEvent) -> Result<()>;
    async fn append_admin_action(&mut self, action: AdminAction) -> Result<()>;
    async fn audit_for_shop(&mut self, shop_id: ShopId) -> Result<Vec<AuditEntry>>;
    /// Ordered by occurrence.
    async fn events_for_service(&mut self, service_id: ServiceId) -> Result<Vec<ServiceEvent>>;
    async fn admin_actions_for_service(&mut self, service_id: ServiceId) -> Result<Vec<AdminAction>>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// What the engine asks the payment platform to collect.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub title: String,
    pub amount: Decimal,
    pub currency: String,
    /// Carries the milestone reference back on the settlement event.
    pub note: String,
}

/// External platform that creates hosted payment requests (e.g. draft orders).
#[async_trait]
pub trait PaymentPlatform: Send + Sync {
    async fn create_payment_request(&self, shop: &Shop, request: PaymentRequest) -> Result<PaymentLink>;
}

/// Checks that an inbound body was signed with the shared secret.
pub trait MessageVerifier: Send + Sync {
    fn verify(&self, body: &[u8], signature: &str, secret: &str) -> bool;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type StoreRef = Arc<dyn EscrowStore>;
pub type PaymentPlatformRef = Arc<dyn PaymentPlatform>;
pub type VerifierRef = Arc<dyn MessageVerifier>;
pub type ClockRef = Arc<dyn Clock>;
