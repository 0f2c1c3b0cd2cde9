use serde::{Deserialize, Deserializer};

/// Reads an explicit `null` the same as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The subset of a platform order the workflow reacts to. Every field is
/// optional on the wire; [`OrderPaidPayload::is_actionable`] decides whether
/// enough of it arrived.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrderPaidPayload {
    #[serde(deserialize_with = "null_as_default")]
    pub id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total_price: String,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub note: String,
    #[serde(deserialize_with = "null_as_default")]
    pub customer: Customer,
    #[serde(deserialize_with = "null_as_default")]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Customer {
    #[serde(deserialize_with = "null_as_default")]
    pub first_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub last_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LineItem {
    #[serde(deserialize_with = "null_as_default")]
    pub product_id: i64,
}

impl OrderPaidPayload {
    pub fn is_actionable(&self) -> bool {
        self.id != 0 && !self.total_price.trim().is_empty() && !self.line_items.is_empty()
    }

    pub fn order_id(&self) -> String {
        self.id.to_string()
    }

    /// Product ids in line-item order, skipping items without a product.
    pub fn product_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.line_items
            .iter()
            .filter(|li| li.product_id != 0)
            .map(|li| li.product_id.to_string())
    }

    pub fn customer_name(&self) -> Option<String> {
        let name = format!("{} {}", self.customer.first_name.trim(), self.customer.last_name.trim());
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    pub fn email(&self) -> Option<String> {
        let email = self.email.trim();
        (!email.is_empty()).then(|| email.to_string())
    }

    pub fn currency(&self) -> Option<String> {
        let currency = self.currency.trim();
        (!currency.is_empty()).then(|| currency.to_ascii_uppercase())
    }
}

/// Settlement of a previously requested milestone payment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MilestonePaidPayload {
    #[serde(alias = "payment_request_id", deserialize_with = "null_as_default")]
    pub draft_order_id: String,
}

impl MilestonePaidPayload {
    pub fn reference(&self) -> Option<&str> {
        let reference = self.draft_order_id.trim();
        (!reference.is_empty()).then_some(reference)
    }
}
