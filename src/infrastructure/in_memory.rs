use crate::domain::approval::Approval;
use crate::domain::audit::{AdminAction, AuditEntry, ServiceEvent};
use crate::domain::deliverable::{Deliverable, DeliverableKind};
use crate::domain::ledger::{IdempotencyRecord, InsertOutcome, LedgerKey};
use crate::domain::milestone::Milestone;
use crate::domain::portal::PortalToken;
use crate::domain::ports::{EscrowStore, StoreTx};
use crate::domain::service::Service;
use crate::domain::shop::{ProductConfig, Shop};
use crate::domain::{MilestoneId, ServiceId, ShopId};
use crate::error::{EscrowError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex as SlotMutex};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Default)]
struct Tables {
    shops: HashMap<ShopId, Shop>,
    product_configs: HashMap<(ShopId, String), ProductConfig>,
    ledger: HashMap<LedgerKey, IdempotencyRecord>,
    services: HashMap<ServiceId, Service>,
    milestones: HashMap<MilestoneId, Milestone>,
    approvals: HashMap<ServiceId, Approval>,
    deliverables: Vec<Deliverable>,
    portal_tokens: HashMap<String, PortalToken>,
    audit: Vec<AuditEntry>,
    events: Vec<ServiceEvent>,
    admin_actions: Vec<AdminAction>,
}

impl Tables {
    fn remove_shop(&mut self, shop_id: ShopId) {
        self.shops.remove(&shop_id);
        self.product_configs.retain(|(shop, _), _| *shop != shop_id);
        self.ledger.retain(|key, _| key.shop_id != shop_id);

        let services: HashSet<ServiceId> = self
            .services
            .values()
            .filter(|s| s.shop_id == shop_id)
            .map(|s| s.id)
            .collect();
        self.services.retain(|id, _| !services.contains(id));
        self.milestones.retain(|_, m| !services.contains(&m.service_id));
        self.approvals.retain(|id, _| !services.contains(id));
        self.deliverables.retain(|d| !services.contains(&d.service_id));
        self.portal_tokens.retain(|_, p| !services.contains(&p.service_id));
        self.events.retain(|e| !services.contains(&e.service_id));
        self.admin_actions.retain(|a| !services.contains(&a.service_id));
        self.audit.retain(|a| a.shop_id != shop_id);
    }
}

/// Writes a transaction has made but not yet committed. A `None` row is a
/// pending delete.
#[derive(Default)]
struct Staged {
    shops: HashMap<ShopId, Option<Shop>>,
    product_configs: HashMap<(ShopId, String), Option<ProductConfig>>,
    ledger: HashMap<LedgerKey, IdempotencyRecord>,
    services: HashMap<ServiceId, Option<Service>>,
    milestones: HashMap<MilestoneId, Option<Milestone>>,
    approvals: HashMap<ServiceId, Option<Approval>>,
    portal_tokens: HashMap<String, Option<PortalToken>>,
    deliverables: Vec<Deliverable>,
    audit: Vec<AuditEntry>,
    events: Vec<ServiceEvent>,
    admin_actions: Vec<AdminAction>,
    deleted_shops: HashSet<ShopId>,
    deleted_services: HashSet<ServiceId>,
}

impl Staged {
    /// Rejects rows whose parent a concurrent transaction removed, the way a
    /// foreign key would.
    fn check_parents(&self, tables: &Tables) -> Result<()> {
        for service in self.services.values().flatten() {
            if lookup(&tables.shops, &self.shops, &service.shop_id).is_none() {
                return Err(EscrowError::Store(format!(
                    "shop {} was removed by a concurrent transaction",
                    service.shop_id
                )));
            }
        }
        for milestone in self.milestones.values().flatten() {
            if lookup(&tables.services, &self.services, &milestone.service_id).is_none() {
                return Err(EscrowError::Store(format!(
                    "service {} was removed by a concurrent transaction",
                    milestone.service_id
                )));
            }
        }
        Ok(())
    }

    fn apply(self, tables: &mut Tables) {
        put(&mut tables.shops, self.shops);
        put(&mut tables.product_configs, self.product_configs);
        tables.ledger.extend(self.ledger);
        put(&mut tables.services, self.services);
        put(&mut tables.milestones, self.milestones);
        put(&mut tables.approvals, self.approvals);
        put(&mut tables.portal_tokens, self.portal_tokens);
        tables.deliverables.extend(self.deliverables);
        tables.audit.extend(self.audit);
        tables.events.extend(self.events);
        tables.admin_actions.extend(self.admin_actions);
        // Also sweeps rows other transactions committed for the shop meanwhile.
        for shop_id in self.deleted_shops {
            tables.remove_shop(shop_id);
        }
    }
}

fn put<K: Eq + Hash, V>(table: &mut HashMap<K, V>, staged: HashMap<K, Option<V>>) {
    for (key, row) in staged {
        match row {
            Some(row) => {
                table.insert(key, row);
            }
            None => {
                table.remove(&key);
            }
        }
    }
}

/// One row as this transaction sees it: its own write if any, else the
/// committed row.
fn lookup<'a, K: Eq + Hash, V>(
    committed: &'a HashMap<K, V>,
    staged: &'a HashMap<K, Option<V>>,
    key: &K,
) -> Option<&'a V> {
    match staged.get(key) {
        Some(row) => row.as_ref(),
        None => committed.get(key),
    }
}

/// Every row of a table as this transaction sees it.
fn rows<'a, K: Eq + Hash, V>(
    committed: &'a HashMap<K, V>,
    staged: &'a HashMap<K, Option<V>>,
) -> impl Iterator<Item = &'a V> {
    committed
        .iter()
        .filter(move |(key, _)| !staged.contains_key(*key))
        .map(|(_, row)| row)
        .chain(staged.values().flatten())
}

/// Identity of a lockable row, or of a unique key about to be claimed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Shop(String),
    Ledger(LedgerKey),
    Order(ShopId, String),
    Sequence(ServiceId, u32),
    PortalToken(String),
    Service(ServiceId),
    Milestone(MilestoneId),
    Approval(ServiceId),
}

#[derive(Default)]
struct RowLocks {
    slots: SlotMutex<HashMap<RowKey, Arc<Mutex<()>>>>,
}

impl RowLocks {
    fn slot(&self, key: &RowKey) -> Arc<Mutex<()>> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.entry(key.clone()).or_default().clone()
    }
}

/// A thread-safe in-memory implementation of the transactional store.
///
/// Committed tables sit behind a `RwLock` that is only held for the length
/// of a single read or of a commit. Isolation comes from row locks: `lock_*`
/// and `update_*` hold the row until the transaction ends, and unique inserts
/// hold the key they claim, so a competing insert waits and then sees the
/// winner's row. Writes are staged per transaction and applied atomically
/// on commit; a dropped transaction leaves no trace.
///
/// Rows owned by a service (milestones, its approval) are locked after the
/// service row itself, so lock order is the same in every transaction.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    locks: Arc<RowLocks>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EscrowStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        Ok(Box::new(InMemoryTx {
            tables: self.tables.clone(),
            locks: self.locks.clone(),
            held: HashMap::new(),
            staged: Staged::default(),
        }))
    }
}

struct InMemoryTx {
    tables: Arc<RwLock<Tables>>,
    locks: Arc<RowLocks>,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    staged: Staged,
}

impl InMemoryTx {
    /// Blocks until this transaction owns `key`. Re-entrant.
    async fn hold(&mut self, key: RowKey) {
        if self.held.contains_key(&key) {
            return;
        }
        let guard = self.locks.slot(&key).lock_owned().await;
        self.held.insert(key, guard);
    }

    async fn hold_service_row(&mut self, service_id: ServiceId, row: RowKey) {
        self.hold(RowKey::Service(service_id)).await;
        self.hold(row).await;
    }

    fn service_in_shop(&self, tables: &Tables, shop_id: ShopId, service_id: ServiceId) -> bool {
        lookup(&tables.services, &self.staged.services, &service_id).is_some_and(|s| s.shop_id == shop_id)
    }

    fn service_visible(&self, service_id: &ServiceId) -> bool {
        !self.staged.deleted_services.contains(service_id)
    }
}

fn missing(what: &str) -> EscrowError {
    EscrowError::Store(format!("{what} row vanished inside transaction"))
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn upsert_shop(&mut self, shop: Shop) -> Result<Shop> {
        self.hold(RowKey::Shop(shop.domain.clone())).await;
        let existing = {
            let tables = self.tables.read().await;
            rows(&tables.shops, &self.staged.shops)
                .find(|s| s.domain == shop.domain)
                .cloned()
        };
        let stored = match existing {
            Some(mut s) => {
                s.access_token = shop.access_token;
                s
            }
            None => shop,
        };
        self.staged.shops.insert(stored.id, Some(stored.clone()));
        Ok(stored)
    }

    async fn find_shop_by_domain(&mut self, domain: &str) -> Result<Option<Shop>> {
        let domain = domain.trim().to_ascii_lowercase();
        let tables = self.tables.read().await;
        Ok(rows(&tables.shops, &self.staged.shops)
            .find(|s| s.domain == domain)
            .cloned())
    }

    async fn find_shop(&mut self, shop_id: ShopId) -> Result<Option<Shop>> {
        let tables = self.tables.read().await;
        Ok(lookup(&tables.shops, &self.staged.shops, &shop_id).cloned())
    }

    async fn delete_shop(&mut self, shop_id: ShopId) -> Result<()> {
        let (domain, mut services) = {
            let tables = self.tables.read().await;
            let domain = lookup(&tables.shops, &self.staged.shops, &shop_id).map(|s| s.domain.clone());
            let services: Vec<ServiceId> = rows(&tables.services, &self.staged.services)
                .filter(|s| s.shop_id == shop_id)
                .map(|s| s.id)
                .collect();
            (domain, services)
        };
        if let Some(domain) = domain {
            self.hold(RowKey::Shop(domain)).await;
        }
        services.sort();
        for service_id in services {
            self.hold(RowKey::Service(service_id)).await;
        }

        let tables = self.tables.clone();
        let tables = tables.read().await;
        let staged = &mut self.staged;

        let services: HashSet<ServiceId> = rows(&tables.services, &staged.services)
            .filter(|s| s.shop_id == shop_id)
            .map(|s| s.id)
            .collect();
        let configs: Vec<(ShopId, String)> = rows(&tables.product_configs, &staged.product_configs)
            .filter(|c| c.shop_id == shop_id)
            .map(|c| (c.shop_id, c.product_id.clone()))
            .collect();
        let milestones: Vec<MilestoneId> = rows(&tables.milestones, &staged.milestones)
            .filter(|m| services.contains(&m.service_id))
            .map(|m| m.id)
            .collect();
        let tokens: Vec<String> = rows(&tables.portal_tokens, &staged.portal_tokens)
            .filter(|p| services.contains(&p.service_id))
            .map(|p| p.token.clone())
            .collect();

        staged.shops.insert(shop_id, None);
        staged.product_configs.extend(configs.into_iter().map(|k| (k, None)));
        staged.milestones.extend(milestones.into_iter().map(|k| (k, None)));
        staged.portal_tokens.extend(tokens.into_iter().map(|k| (k, None)));
        for service_id in &services {
            staged.services.insert(*service_id, None);
            staged.approvals.insert(*service_id, None);
        }
        staged.ledger.retain(|key, _| key.shop_id != shop_id);
        staged.deliverables.retain(|d| !services.contains(&d.service_id));
        staged.events.retain(|e| !services.contains(&e.service_id));
        staged.admin_actions.retain(|a| !services.contains(&a.service_id));
        staged.audit.retain(|a| a.shop_id != shop_id);
        staged.deleted_shops.insert(shop_id);
        staged.deleted_services.extend(services);
        Ok(())
    }

    async fn upsert_product_config(&mut self, config: ProductConfig) -> Result<()> {
        self.staged
            .product_configs
            .insert((config.shop_id, config.product_id.clone()), Some(config));
        Ok(())
    }

    async fn product_config(&mut self, shop_id: ShopId, product_id: &str) -> Result<Option<ProductConfig>> {
        let tables = self.tables.read().await;
        Ok(lookup(
            &tables.product_configs,
            &self.staged.product_configs,
            &(shop_id, product_id.to_string()),
        )
        .cloned())
    }

    async fn insert_ledger_record(&mut self, record: IdempotencyRecord) -> Result<InsertOutcome> {
        self.hold(RowKey::Ledger(record.key.clone())).await;
        let exists = {
            let tables = self.tables.read().await;
            self.staged.ledger.contains_key(&record.key)
                || (tables.ledger.contains_key(&record.key)
                    && !self.staged.deleted_shops.contains(&record.key.shop_id))
        };
        if exists {
            return Ok(InsertOutcome::AlreadyExists);
        }
        self.staged.ledger.insert(record.key.clone(), record);
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_service(&mut self, service: Service) -> Result<InsertOutcome> {
        self.hold(RowKey::Order(service.shop_id, service.order_id.clone()))
            .await;
        let duplicate = {
            let tables = self.tables.read().await;
            lookup(&tables.services, &self.staged.services, &service.id).is_some()
                || rows(&tables.services, &self.staged.services)
                    .any(|s| s.shop_id == service.shop_id && s.order_id == service.order_id)
        };
        if duplicate {
            return Ok(InsertOutcome::AlreadyExists);
        }
        self.staged.services.insert(service.id, Some(service));
        Ok(InsertOutcome::Inserted)
    }

    async fn service_by_order(&mut self, shop_id: ShopId, order_id: &str) -> Result<Option<Service>> {
        let tables = self.tables.read().await;
        Ok(rows(&tables.services, &self.staged.services)
            .find(|s| s.shop_id == shop_id && s.order_id == order_id)
            .cloned())
    }

    async fn services_for_shop(&mut self, shop_id: ShopId) -> Result<Vec<Service>> {
        let tables = self.tables.read().await;
        let mut out: Vec<Service> = rows(&tables.services, &self.staged.services)
            .filter(|s| s.shop_id == shop_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn find_service(&mut self, service_id: ServiceId) -> Result<Option<Service>> {
        let tables = self.tables.read().await;
        Ok(lookup(&tables.services, &self.staged.services, &service_id).cloned())
    }

    async fn lock_service(&mut self, shop_id: ShopId, service_id: ServiceId) -> Result<Option<Service>> {
        Ok(self
            .lock_service_any(service_id)
            .await?
            .filter(|s| s.shop_id == shop_id))
    }

    async fn lock_service_any(&mut self, service_id: ServiceId) -> Result<Option<Service>> {
        self.hold(RowKey::Service(service_id)).await;
        self.find_service(service_id).await
    }

    async fn update_service(&mut self, service: &Service) -> Result<()> {
        self.hold(RowKey::Service(service.id)).await;
        if self.find_service(service.id).await?.is_none() {
            return Err(missing("service"));
        }
        self.staged.services.insert(service.id, Some(service.clone()));
        Ok(())
    }

    async fn insert_milestone(&mut self, milestone: Milestone) -> Result<InsertOutcome> {
        self.hold(RowKey::Sequence(milestone.service_id, milestone.sequence))
            .await;
        let duplicate = {
            let tables = self.tables.read().await;
            lookup(&tables.milestones, &self.staged.milestones, &milestone.id).is_some()
                || rows(&tables.milestones, &self.staged.milestones)
                    .any(|m| m.service_id == milestone.service_id && m.sequence == milestone.sequence)
        };
        if duplicate {
            return Ok(InsertOutcome::AlreadyExists);
        }
        self.staged.milestones.insert(milestone.id, Some(milestone));
        Ok(InsertOutcome::Inserted)
    }

    async fn lock_milestone(&mut self, shop_id: ShopId, milestone_id: MilestoneId) -> Result<Option<Milestone>> {
        let owner = {
            let tables = self.tables.read().await;
            lookup(&tables.milestones, &self.staged.milestones, &milestone_id).map(|m| m.service_id)
        };
        let Some(service_id) = owner else {
            return Ok(None);
        };
        self.hold_service_row(service_id, RowKey::Milestone(milestone_id))
            .await;

        // Re-read: the row may have changed while we waited for it.
        let tables = self.tables.read().await;
        Ok(lookup(&tables.milestones, &self.staged.milestones, &milestone_id)
            .filter(|m| self.service_in_shop(&tables, shop_id, m.service_id))
            .cloned())
    }

    async fn milestone_by_payment_ref(&mut self, shop_id: ShopId, reference: &str) -> Result<Option<MilestoneId>> {
        let tables = self.tables.read().await;
        Ok(rows(&tables.milestones, &self.staged.milestones)
            .filter(|m| m.payment.as_ref().is_some_and(|p| p.reference == reference))
            .find(|m| self.service_in_shop(&tables, shop_id, m.service_id))
            .map(|m| m.id))
    }

    async fn milestones_for_service(&mut self, service_id: ServiceId) -> Result<Vec<Milestone>> {
        let tables = self.tables.read().await;
        let mut out: Vec<Milestone> = rows(&tables.milestones, &self.staged.milestones)
            .filter(|m| m.service_id == service_id)
            .cloned()
            .collect();
        out.sort_by_key(|m| m.sequence);
        Ok(out)
    }

    async fn update_milestone(&mut self, milestone: &Milestone) -> Result<()> {
        self.hold_service_row(milestone.service_id, RowKey::Milestone(milestone.id))
            .await;
        let exists = {
            let tables = self.tables.read().await;
            lookup(&tables.milestones, &self.staged.milestones, &milestone.id).is_some()
        };
        if !exists {
            return Err(missing("milestone"));
        }
        self.staged
            .milestones
            .insert(milestone.id, Some(milestone.clone()));
        Ok(())
    }

    async fn find_approval(&mut self, service_id: ServiceId) -> Result<Option<Approval>> {
        let tables = self.tables.read().await;
        Ok(lookup(&tables.approvals, &self.staged.approvals, &service_id).cloned())
    }

    async fn lock_approval(&mut self, service_id: ServiceId) -> Result<Option<Approval>> {
        self.hold_service_row(service_id, RowKey::Approval(service_id))
            .await;
        self.find_approval(service_id).await
    }

    async fn upsert_approval(&mut self, approval: &Approval) -> Result<()> {
        self.hold_service_row(approval.service_id, RowKey::Approval(approval.service_id))
            .await;
        self.staged
            .approvals
            .insert(approval.service_id, Some(approval.clone()));
        Ok(())
    }

    async fn insert_deliverable(&mut self, deliverable: Deliverable) -> Result<()> {
        self.staged.deliverables.push(deliverable);
        Ok(())
    }

    async fn has_preview(&mut self, service_id: ServiceId) -> Result<bool> {
        if !self.service_visible(&service_id) {
            return Ok(false);
        }
        let tables = self.tables.read().await;
        Ok(tables
            .deliverables
            .iter()
            .chain(&self.staged.deliverables)
            .any(|d| d.service_id == service_id && d.kind == DeliverableKind::Preview))
    }

    async fn insert_portal_token(&mut self, token: PortalToken) -> Result<()> {
        self.staged
            .portal_tokens
            .insert(token.token.clone(), Some(token));
        Ok(())
    }

    async fn find_portal_token(&mut self, token: &str) -> Result<Option<PortalToken>> {
        let tables = self.tables.read().await;
        Ok(lookup(&tables.portal_tokens, &self.staged.portal_tokens, &token.to_string()).cloned())
    }

    async fn lock_portal_token(&mut self, token: &str) -> Result<Option<PortalToken>> {
        self.hold(RowKey::PortalToken(token.to_string())).await;
        self.find_portal_token(token).await
    }

    async fn active_portal_token(&mut self, service_id: ServiceId, now: DateTime<Utc>) -> Result<Option<PortalToken>> {
        let tables = self.tables.read().await;
        Ok(rows(&tables.portal_tokens, &self.staged.portal_tokens)
            .filter(|t| t.service_id == service_id && t.is_active(now))
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn append_audit(&mut self, entry: AuditEntry) -> Result<()> {
        self.staged.audit.push(entry);
        Ok(())
    }

    async fn append_event(&mut self, event: ServiceEvent) -> Result<()> {
        self.staged.events.push(event);
        Ok(())
    }

    async fn append_admin_action(&mut self, action: AdminAction) -> Result<()> {
        self.staged.admin_actions.push(action);
        Ok(())
    }

    async fn audit_for_shop(&mut self, shop_id: ShopId) -> Result<Vec<AuditEntry>> {
        if self.staged.deleted_shops.contains(&shop_id) {
            return Ok(Vec::new());
        }
        let tables = self.tables.read().await;
        Ok(tables
            .audit
            .iter()
            .chain(&self.staged.audit)
            .filter(|a| a.shop_id == shop_id)
            .cloned()
            .collect())
    }

    async fn events_for_service(&mut self, service_id: ServiceId) -> Result<Vec<ServiceEvent>> {
        if !self.service_visible(&service_id) {
            return Ok(Vec::new());
        }
        // Committed rows precede this transaction's own appends.
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .chain(&self.staged.events)
            .filter(|e| e.service_id == service_id)
            .cloned()
            .collect())
    }

    async fn admin_actions_for_service(&mut self, service_id: ServiceId) -> Result<Vec<AdminAction>> {
        if !self.service_visible(&service_id) {
            return Ok(Vec::new());
        }
        let tables = self.tables.read().await;
        Ok(tables
            .admin_actions
            .iter()
            .chain(&self.staged.admin_actions)
            .filter(|a| a.service_id == service_id)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTx {
            tables, held, staged, ..
        } = *self;
        let mut tables = tables.write().await;
        staged.check_parents(&tables)?;
        staged.apply(&mut tables);
        drop(tables);
        // Row locks outlive the write so waiters read the committed rows.
        drop(held);
        Ok(())
    }
}
