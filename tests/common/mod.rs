#![allow(dead_code)]

use escrow_workflow::application::engine::EscrowEngine;
use escrow_workflow::application::ingest::{InboundEvent, IngestOutcome};
use escrow_workflow::config::EngineConfig;
use escrow_workflow::domain::ServiceId;
use escrow_workflow::domain::milestone::Milestone;
use escrow_workflow::domain::shop::Shop;
use escrow_workflow::infrastructure::clock::SystemClock;
use escrow_workflow::infrastructure::hmac::{HmacSha256Verifier, sign};
use escrow_workflow::infrastructure::in_memory::InMemoryStore;
use escrow_workflow::infrastructure::simulated_platform::SimulatedPaymentPlatform;
use serde_json::{Value, json};
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const SECRET: &str = "integration-secret";
pub const SHOP: &str = "studio.example.com";
pub const PRODUCT_ID: i64 = 501;

pub struct TestEnv {
    pub engine: Arc<EscrowEngine>,
    pub platform: Arc<SimulatedPaymentPlatform>,
    pub shop: Shop,
}

pub fn deposit_and_final_template() -> Value {
    json!({"version": 2, "templates": [
        {"type": "fixed", "value": 25, "isFinal": false},
        {"type": "percentage", "value": 10, "isFinal": false},
        {"type": "percentage", "value": 90, "isFinal": true}
    ]})
}

pub async fn setup() -> TestEnv {
    setup_with(SimulatedPaymentPlatform::new()).await
}

pub async fn setup_with_latency(latency: Duration) -> TestEnv {
    setup_with(SimulatedPaymentPlatform::with_latency(latency)).await
}

async fn setup_with(platform: SimulatedPaymentPlatform) -> TestEnv {
    let platform = Arc::new(platform);
    let engine = Arc::new(EscrowEngine::new(
        Arc::new(InMemoryStore::new()),
        platform.clone(),
        Arc::new(HmacSha256Verifier),
        Arc::new(SystemClock),
        EngineConfig::new(SECRET),
    ));
    let shop = engine.install_shop(SHOP, "shop-token").await.unwrap();
    engine
        .configure_product(shop.id, &PRODUCT_ID.to_string(), deposit_and_final_template())
        .await
        .unwrap();
    TestEnv {
        engine,
        platform,
        shop,
    }
}

pub fn order_body(order_id: i64, total: &str) -> Value {
    json!({
        "id": order_id,
        "email": "buyer@example.com",
        "total_price": total,
        "currency": "cad",
        "customer": {"first_name": "Grace", "last_name": "Hopper"},
        "line_items": [{"product_id": PRODUCT_ID}]
    })
}

pub fn signed(topic: &str, body: &Value, event_id: Option<&str>) -> InboundEvent {
    let body = serde_json::to_vec(body).unwrap();
    InboundEvent {
        shop_domain: SHOP.to_string(),
        topic: topic.to_string(),
        event_id: event_id.map(str::to_string),
        signature: sign(&body, SECRET),
        body,
    }
}

impl TestEnv {
    pub async fn book(&self, order_id: i64, total: &str) -> ServiceId {
        let event = signed("orders/paid", &order_body(order_id, total), None);
        match self.engine.ingest_event(event).await.unwrap() {
            IngestOutcome::ServiceBooked { service_id, .. } => service_id,
            other => panic!("order {order_id} not booked: {other:?}"),
        }
    }

    pub async fn milestones(&self, service_id: ServiceId) -> Vec<Milestone> {
        self.engine
            .service_detail(self.shop.id, service_id)
            .await
            .unwrap()
            .milestones
    }
}

/// Writes a scenario booking `orders` services and walking each one to completion.
pub fn generate_scenario(path: &Path, orders: usize) -> Result<(), Error> {
    let mut steps = Vec::new();
    for i in 1..=orders {
        let order = (1000 + i).to_string();
        steps.push(json!({"action": "webhook", "shop": SHOP, "topic": "orders/paid",
            "body": order_body(1000 + i as i64, "200.00")}));
        steps.push(json!({"action": "request_payment", "shop": SHOP, "order": order, "sequence": 1}));
        steps.push(json!({"action": "settle", "shop": SHOP, "order": order, "sequence": 1}));
        steps.push(json!({"action": "status", "shop": SHOP, "order": order, "to": "InProgress"}));
        steps.push(json!({"action": "status", "shop": SHOP, "order": order, "to": "WaitingForApproval"}));
        steps.push(json!({"action": "approve", "shop": SHOP, "order": order}));
        steps.push(json!({"action": "request_payment", "shop": SHOP, "order": order, "sequence": 2}));
        steps.push(json!({"action": "settle", "shop": SHOP, "order": order, "sequence": 2}));
    }

    let scenario = json!({
        "shops": [{
            "domain": SHOP,
            "access_token": "shop-token",
            "products": [{"product_id": PRODUCT_ID.to_string(), "config": deposit_and_final_template()}]
        }],
        "steps": steps
    });
    serde_json::to_writer_pretty(File::create(path)?, &scenario)?;
    Ok(())
}
