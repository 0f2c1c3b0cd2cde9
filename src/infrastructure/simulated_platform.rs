use crate::domain::milestone::PaymentLink;
use crate::domain::ports::{PaymentPlatform, PaymentRequest};
use crate::domain::shop::Shop;
use crate::error::{EscrowError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Stand-in for the e-commerce platform's payment-request API.
///
/// Hands out sequential draft-order style references, remembers every
/// request it saw, and can be told to fail or to respond slowly.
#[derive(Debug, Default)]
pub struct SimulatedPaymentPlatform {
    next_id: AtomicU64,
    fail: AtomicBool,
    latency: Option<Duration>,
    requests: Mutex<Vec<PaymentRequest>>,
}

impl SimulatedPaymentPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }
}

#[async_trait]
impl PaymentPlatform for SimulatedPaymentPlatform {
    async fn create_payment_request(&self, shop: &Shop, request: PaymentRequest) -> Result<PaymentLink> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(EscrowError::Platform("payment request rejected by platform".to_string()));
        }

        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentLink {
            reference: format!("gid://platform/DraftOrder/{id}"),
            redirect_url: format!("https://{}/invoices/{id}", shop.domain),
        })
    }
}
