use super::money::{Amount, CurrencyScale};
use super::template::{MilestoneTemplate, TemplateKind, validate_template};
use crate::error::{Result, ValidationError};
use rust_decimal::Decimal;
use serde::Serialize;

/// An amount computed from one template entry. Sequence is positional: the
/// deposit is index 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalculatedMilestone {
    pub amount: Decimal,
    pub is_final: bool,
}

/// Splits `total` into milestone amounts according to `templates`.
///
/// Percentages are applied against the full total, not a shrinking remainder,
/// so each non-final amount is reproducible on its own. Every amount is
/// rounded to `scale`; whatever rounding slack remains is added to the final
/// entry so the amounts always sum to the rounded total.
pub fn calculate_amounts(
    total: Decimal,
    templates: &[MilestoneTemplate],
    scale: CurrencyScale,
) -> Result<Vec<CalculatedMilestone>> {
    validate_template(templates)?;
    let total = Amount::new(total)?.value();

    let mut out = Vec::with_capacity(templates.len());
    for t in templates {
        let raw = match t.kind {
            TemplateKind::Fixed => t.value,
            TemplateKind::Percentage => total
                .checked_mul(t.value)
                .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
                .ok_or(ValidationError::TotalInvalid)?,
        };
        out.push(CalculatedMilestone {
            amount: scale.round(raw),
            is_final: t.is_final,
        });
    }

    let sum = out
        .iter()
        .try_fold(Decimal::ZERO, |acc, m| acc.checked_add(m.amount))
        .ok_or(ValidationError::ValueInvalid)?;
    let delta = scale
        .round(total)
        .checked_sub(sum)
        .ok_or(ValidationError::ValueInvalid)?;

    // validate_template guarantees a non-empty list ending in the final entry.
    let Some(last) = out.last_mut() else {
        return Err(ValidationError::TemplateEmpty.into());
    };
    if !delta.is_zero() {
        let corrected = last
            .amount
            .checked_add(delta)
            .ok_or(ValidationError::FinalMilestoneInvalid)?;
        last.amount = scale.round(corrected);
    }
    if last.amount <= Decimal::ZERO {
        return Err(ValidationError::FinalMilestoneInvalid.into());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EscrowError;
    use rust_decimal_macros::dec;

    fn amounts(total: Decimal, templates: &[MilestoneTemplate]) -> Vec<Decimal> {
        calculate_amounts(total, templates, CurrencyScale::DEFAULT)
            .unwrap()
            .into_iter()
            .map(|m| m.amount)
            .collect()
    }

    #[test]
    fn test_thirds_sum_to_total() {
        let templates = vec![
            MilestoneTemplate::percentage(dec!(33), false),
            MilestoneTemplate::percentage(dec!(33), false),
            MilestoneTemplate::percentage(dec!(34), true),
        ];
        let got = calculate_amounts(dec!(100.00), &templates, CurrencyScale::DEFAULT).unwrap();
        assert_eq!(
            got.iter().map(|m| m.amount).collect::<Vec<_>>(),
            vec![dec!(33.00), dec!(33.00), dec!(34.00)]
        );
        assert!(got[2].is_final);
        assert!(!got[0].is_final);
    }

    #[test]
    fn test_rounding_delta_goes_to_final() {
        let templates = vec![
            MilestoneTemplate::percentage(dec!(50), false),
            MilestoneTemplate::percentage(dec!(50), true),
        ];
        // 5.005 rounds up to 5.01 for both; the final entry gives back the extra cent.
        assert_eq!(amounts(dec!(10.01), &templates), vec![dec!(5.01), dec!(5.00)]);
    }

    #[test]
    fn test_fixed_and_percentage_mix() {
        let templates = vec![
            MilestoneTemplate::fixed(dec!(25), false),
            MilestoneTemplate::percentage(dec!(10), false),
            MilestoneTemplate::percentage(dec!(20), true),
        ];
        // Final absorbs everything the template does not cover.
        assert_eq!(
            amounts(dec!(200), &templates),
            vec![dec!(25), dec!(20), dec!(155)]
        );
    }

    #[test]
    fn test_sum_matches_rounded_total_across_totals() {
        let templates = vec![
            MilestoneTemplate::percentage(dec!(30), false),
            MilestoneTemplate::percentage(dec!(30), false),
            MilestoneTemplate::percentage(dec!(40), true),
        ];
        for total in [dec!(0.01), dec!(0.07), dec!(1.11), dec!(99.99), dec!(1234.567), dec!(1000001)] {
            let got = calculate_amounts(total, &templates, CurrencyScale::DEFAULT);
            let Ok(got) = got else {
                // Tiny totals can leave nothing for the final milestone.
                assert!(total < dec!(0.05));
                continue;
            };
            let sum: Decimal = got.iter().map(|m| m.amount).sum();
            assert_eq!(sum, CurrencyScale::DEFAULT.round(total), "total {total}");
        }
    }

    #[test]
    fn test_total_must_be_positive() {
        let templates = vec![MilestoneTemplate::percentage(dec!(100), true)];
        for total in [dec!(0), dec!(-10)] {
            assert!(matches!(
                calculate_amounts(total, &templates, CurrencyScale::DEFAULT),
                Err(EscrowError::Validation(ValidationError::TotalInvalid))
            ));
        }
    }

    #[test]
    fn test_fixed_overshoot_fails_final() {
        // 80 + 30 + 5 overshoots by 15, which would drive the final to -10.
        let templates = vec![
            MilestoneTemplate::fixed(dec!(80), false),
            MilestoneTemplate::fixed(dec!(30), false),
            MilestoneTemplate::percentage(dec!(5), true),
        ];
        assert!(matches!(
            calculate_amounts(dec!(100), &templates, CurrencyScale::DEFAULT),
            Err(EscrowError::Validation(ValidationError::FinalMilestoneInvalid))
        ));
    }

    #[test]
    fn test_invalid_template_is_rejected_before_total() {
        assert!(matches!(
            calculate_amounts(dec!(0), &[], CurrencyScale::DEFAULT),
            Err(EscrowError::Validation(ValidationError::TemplateEmpty))
        ));
    }

    #[test]
    fn test_arithmetic_limits_are_validation_errors() {
        let percentages = vec![
            MilestoneTemplate::percentage(dec!(30), false),
            MilestoneTemplate::percentage(dec!(70), true),
        ];
        assert!(matches!(
            calculate_amounts(Decimal::MAX, &percentages, CurrencyScale::DEFAULT),
            Err(EscrowError::Validation(ValidationError::TotalInvalid))
        ));

        let fixed = vec![
            MilestoneTemplate::fixed(Decimal::MAX, false),
            MilestoneTemplate::fixed(Decimal::MAX, true),
        ];
        assert!(matches!(
            calculate_amounts(dec!(100), &fixed, CurrencyScale::DEFAULT),
            Err(EscrowError::Validation(ValidationError::ValueInvalid))
        ));
    }

    #[test]
    fn test_whole_unit_scale() {
        let templates = vec![
            MilestoneTemplate::percentage(dec!(50), false),
            MilestoneTemplate::percentage(dec!(50), true),
        ];
        let got = calculate_amounts(dec!(1001), &templates, CurrencyScale::new(0)).unwrap();
        assert_eq!(got[0].amount, dec!(501));
        assert_eq!(got[1].amount, dec!(500));
    }
}
