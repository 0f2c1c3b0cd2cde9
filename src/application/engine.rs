use crate::config::EngineConfig;
use crate::domain::ShopId;
use crate::domain::ports::{ClockRef, PaymentPlatformRef, StoreRef, StoreTx, VerifierRef};
use crate::domain::shop::{ProductConfig, Shop};
use crate::domain::template::ServiceConfig;
use crate::error::{EscrowError, Result, ValidationError};
use tracing::info;

/// The entry point of the escrow workflow.
///
/// `EscrowEngine` holds no mutable state of its own: every operation runs in
/// a single store transaction, so one engine can be shared behind an `Arc`
/// and driven from many tasks at once.
pub struct EscrowEngine {
    pub(crate) store: StoreRef,
    pub(crate) platform: PaymentPlatformRef,
    pub(crate) verifier: VerifierRef,
    pub(crate) clock: ClockRef,
    pub(crate) config: EngineConfig,
}

impl EscrowEngine {
    /// Creates a new `EscrowEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `store` - Transactional store holding all workflow state.
    /// * `platform` - Client for the e-commerce platform's payment requests.
    /// * `verifier` - Authenticates inbound webhook bodies.
    /// * `clock` - Source of timestamps.
    /// * `config` - Engine settings.
    pub fn new(
        store: StoreRef,
        platform: PaymentPlatformRef,
        verifier: VerifierRef,
        clock: ClockRef,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            platform,
            verifier,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers a shop, or refreshes the access token of an already
    /// installed one with the same domain.
    pub async fn install_shop(&self, domain: &str, access_token: &str) -> Result<Shop> {
        let shop = Shop::new(domain, access_token, self.clock.now());
        if shop.domain.is_empty() {
            return Err(ValidationError::Required("shop domain").into());
        }

        let mut tx = self.store.begin().await?;
        let shop = tx.upsert_shop(shop).await?;
        tx.commit().await?;

        info!(shop = %shop.domain, shop_id = %shop.id, "shop installed");
        Ok(shop)
    }

    /// Validates and stores the service configuration of one product.
    ///
    /// The raw JSON is kept as given; services snapshot it when booked.
    pub async fn configure_product(
        &self,
        shop_id: ShopId,
        product_id: &str,
        config: serde_json::Value,
    ) -> Result<ServiceConfig> {
        let parsed = ServiceConfig::parse_and_validate(&config)?;
        let product_id = product_id.trim();
        if product_id.is_empty() {
            return Err(ValidationError::Required("product id").into());
        }

        let mut tx = self.store.begin().await?;
        require_shop(tx.as_mut(), shop_id).await?;
        tx.upsert_product_config(ProductConfig {
            shop_id,
            product_id: product_id.to_string(),
            config,
            updated_at: self.clock.now(),
        })
        .await?;
        tx.commit().await?;

        info!(%shop_id, product_id, milestones = parsed.templates.len(), "service product configured");
        Ok(parsed)
    }
}

pub(crate) async fn require_shop(tx: &mut dyn StoreTx, shop_id: ShopId) -> Result<Shop> {
    tx.find_shop(shop_id).await?.ok_or(EscrowError::NotFound("shop"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::Harness;
    use serde_json::json;

    #[tokio::test]
    async fn test_install_shop_is_upsert_by_domain() {
        let h = Harness::new().await;
        let again = h.engine.install_shop(" Demo.Example.com ", "rotated").await.unwrap();
        assert_eq!(again.id, h.shop.id);
        assert_eq!(again.access_token, "rotated");
    }

    #[tokio::test]
    async fn test_configure_product_rejects_invalid_template() {
        let h = Harness::new().await;
        let bad = json!({"templates": [
            {"type": "percentage", "value": 50, "isFinal": false},
            {"type": "percentage", "value": 40, "isFinal": true}
        ]});
        let err = h.engine.configure_product(h.shop.id, "9", bad).await.unwrap_err();
        assert!(matches!(
            err,
            EscrowError::Validation(ValidationError::PercentageSumInvalid)
        ));
    }

    #[tokio::test]
    async fn test_configure_product_rejects_overflowing_percentages() {
        let h = Harness::new().await;
        let huge = "79228162514264337593543950335";
        let config = json!({"templates": [
            {"type": "percentage", "value": huge, "isFinal": false},
            {"type": "percentage", "value": huge, "isFinal": true}
        ]});
        let err = h.engine.configure_product(h.shop.id, "9", config).await.unwrap_err();
        assert!(matches!(
            err,
            EscrowError::Validation(ValidationError::PercentageSumInvalid)
        ));
    }

    #[tokio::test]
    async fn test_configure_product_requires_known_shop() {
        let h = Harness::new().await;
        let config = json!({"templates": [{"type": "percentage", "value": 100, "isFinal": true}]});
        let err = h
            .engine
            .configure_product(uuid::Uuid::new_v4(), "9", config)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::NotFound("shop")));
    }

    #[tokio::test]
    async fn test_configure_product_defaults_version() {
        let h = Harness::new().await;
        let config = json!({"currency": "EUR", "templates": [
            {"type": "fixed", "value": 10, "isFinal": false},
            {"type": "percentage", "value": 100, "isFinal": true}
        ]});
        let parsed = h.engine.configure_product(h.shop.id, "9", config).await.unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.currency.as_deref(), Some("EUR"));
    }
}
