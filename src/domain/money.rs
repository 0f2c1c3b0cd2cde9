use crate::error::{Result, ValidationError};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

const MAX_DIGITS: u32 = 28;

/// Number of decimal digits milestone amounts are rounded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyScale(u32);

impl CurrencyScale {
    pub const DEFAULT: Self = Self(2);

    /// Clamps to the maximum scale `Decimal` can represent.
    pub fn new(digits: u32) -> Self {
        Self(digits.min(MAX_DIGITS))
    }

    pub fn digits(&self) -> u32 {
        self.0
    }

    /// Rounds half away from zero, so `5.005` becomes `5.01` at scale 2.
    /// The result always carries exactly `digits` decimal places.
    pub fn round(&self, value: Decimal) -> Decimal {
        let mut rounded = value.round_dp_with_strategy(self.0, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(self.0);
        rounded
    }
}

impl Default for CurrencyScale {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A strictly positive monetary amount, used for service totals.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(ValidationError::TotalInvalid.into())
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = crate::error::EscrowError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EscrowError;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_half_away_from_zero() {
        let scale = CurrencyScale::DEFAULT;
        assert_eq!(scale.round(dec!(5.005)), dec!(5.01));
        assert_eq!(scale.round(dec!(5.004)), dec!(5.00));
        assert_eq!(scale.round(dec!(-5.005)), dec!(-5.01));
        assert_eq!(CurrencyScale::new(0).round(dec!(2.5)), dec!(3));
    }

    #[test]
    fn test_round_pads_to_scale() {
        assert_eq!(CurrencyScale::DEFAULT.round(dec!(60)).to_string(), "60.00");
        assert_eq!(CurrencyScale::DEFAULT.round(dec!(0.5)).to_string(), "0.50");
    }

    #[test]
    fn test_scale_is_clamped() {
        assert_eq!(CurrencyScale::new(99).digits(), MAX_DIGITS);
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(0.01)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0)),
            Err(EscrowError::Validation(ValidationError::TotalInvalid))
        ));
        assert!(Amount::new(dec!(-1)).is_err());
    }
}
