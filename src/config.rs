use crate::domain::money::CurrencyScale;

pub const DEFAULT_CURRENCY: &str = "USD";
pub const DEFAULT_PORTAL_TOKEN_TTL_DAYS: i64 = 30;

/// Engine-wide settings. The binary fills it from arguments and environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Shared secret inbound webhook bodies are signed with.
    pub webhook_secret: String,
    pub currency_scale: CurrencyScale,
    /// Used when neither the order nor the product config names a currency.
    pub default_currency: String,
    pub portal_token_ttl: chrono::Duration,
}

impl EngineConfig {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            webhook_secret: String::new(),
            currency_scale: CurrencyScale::DEFAULT,
            default_currency: DEFAULT_CURRENCY.to_string(),
            portal_token_ttl: chrono::Duration::days(DEFAULT_PORTAL_TOKEN_TTL_DAYS),
        }
    }
}
