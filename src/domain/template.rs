use crate::error::{Result, ValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Fixed,
    Percentage,
}

impl FromStr for TemplateKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "percentage" => Ok(Self::Percentage),
            other => Err(ValidationError::TypeInvalid(other.to_string())),
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => f.write_str("fixed"),
            Self::Percentage => f.write_str("percentage"),
        }
    }
}

/// One entry of a milestone template. `value` is an absolute amount for
/// `Fixed` and a percentage of the total (30 means 30%) for `Percentage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneTemplate {
    #[serde(rename = "type")]
    pub kind: TemplateKind,
    pub value: Decimal,
    #[serde(rename = "isFinal", default)]
    pub is_final: bool,
}

impl MilestoneTemplate {
    pub fn fixed(value: Decimal, is_final: bool) -> Self {
        Self {
            kind: TemplateKind::Fixed,
            value,
            is_final,
        }
    }

    pub fn percentage(value: Decimal, is_final: bool) -> Self {
        Self {
            kind: TemplateKind::Percentage,
            value,
            is_final,
        }
    }
}

/// Enforces the template contract: non-empty, every value positive, exactly
/// one final entry and it is the last one, and an all-percentage template
/// sums to exactly 100.
pub fn validate_template(templates: &[MilestoneTemplate]) -> Result<()> {
    if templates.is_empty() {
        return Err(ValidationError::TemplateEmpty.into());
    }

    let mut final_idx = None;
    for (i, t) in templates.iter().enumerate() {
        if t.value <= Decimal::ZERO {
            return Err(ValidationError::ValueInvalid.into());
        }
        if t.is_final {
            if final_idx.is_some() {
                return Err(ValidationError::FinalDuplicate.into());
            }
            final_idx = Some(i);
        }
    }

    match final_idx {
        None => return Err(ValidationError::FinalMissing.into()),
        Some(i) if i != templates.len() - 1 => return Err(ValidationError::FinalNotLast.into()),
        Some(_) => {}
    }

    if templates.iter().all(|t| t.kind == TemplateKind::Percentage) {
        let sum = templates
            .iter()
            .try_fold(Decimal::ZERO, |acc, t| acc.checked_add(t.value));
        if sum != Some(Decimal::ONE_HUNDRED) {
            return Err(ValidationError::PercentageSumInvalid.into());
        }
    }

    Ok(())
}

/// Per-product service configuration, stored as JSON and copied verbatim
/// onto each service created from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub templates: Vec<MilestoneTemplate>,
}

#[derive(Deserialize)]
struct RawTemplate {
    #[serde(rename = "type", default)]
    kind: String,
    value: Decimal,
    #[serde(rename = "isFinal", default)]
    is_final: bool,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    templates: Vec<RawTemplate>,
}

impl ServiceConfig {
    /// Parses a stored config and validates its template.
    ///
    /// Unknown template types surface as `TypeInvalid` rather than a generic
    /// decode failure, and a missing version defaults to 1.
    pub fn parse_and_validate(raw: &serde_json::Value) -> Result<Self> {
        let raw: RawConfig = serde_json::from_value(raw.clone())
            .map_err(|e| ValidationError::ConfigInvalid(e.to_string()))?;

        let templates = raw
            .templates
            .into_iter()
            .map(|t| {
                Ok(MilestoneTemplate {
                    kind: t.kind.parse()?,
                    value: t.value,
                    is_final: t.is_final,
                })
            })
            .collect::<std::result::Result<Vec<_>, ValidationError>>()?;

        validate_template(&templates)?;

        Ok(Self {
            version: raw.version.max(1),
            currency: raw
                .currency
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            templates,
        })
    }
}
