//! Shared fixtures for the application tests.

use super::engine::EscrowEngine;
use super::ingest::{InboundEvent, IngestOutcome};
use crate::config::EngineConfig;
use crate::domain::milestone::Milestone;
use crate::domain::service::ServiceStatus;
use crate::domain::shop::Shop;
use crate::domain::ServiceId;
use crate::infrastructure::clock::ManualClock;
use crate::infrastructure::hmac::{HmacSha256Verifier, sign};
use crate::infrastructure::in_memory::InMemoryStore;
use crate::infrastructure::simulated_platform::SimulatedPaymentPlatform;
use chrono::TimeZone;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const SECRET: &str = "shh";
pub(crate) const PRODUCT_ID: i64 = 77;

pub(crate) struct Harness {
    pub engine: Arc<EscrowEngine>,
    pub platform: Arc<SimulatedPaymentPlatform>,
    pub clock: Arc<ManualClock>,
    pub shop: Shop,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(SimulatedPaymentPlatform::new()).await
    }

    pub async fn with_latency(latency: Duration) -> Self {
        Self::build(SimulatedPaymentPlatform::with_latency(latency)).await
    }

    async fn build(platform: SimulatedPaymentPlatform) -> Self {
        let platform = Arc::new(platform);
        let start = chrono::Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let engine = Arc::new(EscrowEngine::new(
            Arc::new(InMemoryStore::new()),
            platform.clone(),
            Arc::new(HmacSha256Verifier),
            clock.clone(),
            EngineConfig::new(SECRET),
        ));

        let shop = engine.install_shop("demo.example.com", "access").await.unwrap();
        engine
            .configure_product(
                shop.id,
                &PRODUCT_ID.to_string(),
                json!({"version": 1, "templates": [
                    {"type": "percentage", "value": 30, "isFinal": false},
                    {"type": "percentage", "value": 30, "isFinal": false},
                    {"type": "percentage", "value": 40, "isFinal": true}
                ]}),
            )
            .await
            .unwrap();

        Self {
            engine,
            platform,
            clock,
            shop,
        }
    }

    pub fn webhook(&self, topic: &str, body: &Value, event_id: Option<&str>) -> InboundEvent {
        let body = serde_json::to_vec(body).unwrap();
        InboundEvent {
            shop_domain: self.shop.domain.clone(),
            topic: topic.to_string(),
            event_id: event_id.map(str::to_string),
            signature: sign(&body, SECRET),
            body,
        }
    }

    pub fn order_paid(order_id: i64, total: &str) -> Value {
        json!({
            "id": order_id,
            "email": "client@example.com",
            "total_price": total,
            "customer": {"first_name": "Ada", "last_name": "Lovelace"},
            "line_items": [{"product_id": PRODUCT_ID}]
        })
    }

    pub async fn book(&self, order_id: i64, total: &str) -> ServiceId {
        self.book_with(&Self::order_paid(order_id, total)).await
    }

    pub async fn book_with(&self, body: &Value) -> ServiceId {
        let event = self.webhook("orders/paid", body, None);
        match self.engine.ingest_event(event).await.unwrap() {
            IngestOutcome::ServiceBooked { service_id, .. } => service_id,
            other => panic!("order not booked: {other:?}"),
        }
    }

    pub async fn milestones(&self, service_id: ServiceId) -> Vec<Milestone> {
        self.engine
            .service_detail(self.shop.id, service_id)
            .await
            .unwrap()
            .milestones
    }

    pub async fn portal_token(&self, service_id: ServiceId) -> String {
        self.engine
            .service_detail(self.shop.id, service_id)
            .await
            .unwrap()
            .portal_token
            .unwrap()
            .token
    }

    pub async fn advance_to_waiting(&self, service_id: ServiceId) {
        for next in [ServiceStatus::InProgress, ServiceStatus::WaitingForApproval] {
            self.engine
                .change_status(self.shop.id, service_id, next)
                .await
                .unwrap();
        }
    }
}
