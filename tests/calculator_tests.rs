use escrow_workflow::domain::calculator::calculate_amounts;
use escrow_workflow::domain::money::CurrencyScale;
use escrow_workflow::domain::template::{MilestoneTemplate, validate_template};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn random_percentage_template(rng: &mut StdRng) -> Vec<MilestoneTemplate> {
    let count = rng.gen_range(1..=6);
    let mut remaining = 100u32;
    let mut templates = Vec::new();
    for i in 0..count {
        let is_final = i == count - 1;
        let value = if is_final {
            remaining
        } else {
            let max = remaining - (count - i - 1);
            rng.gen_range(1..=max.min(60))
        };
        remaining -= value;
        templates.push(MilestoneTemplate::percentage(Decimal::from(value), is_final));
    }
    templates
}

#[test]
fn test_amounts_always_sum_to_rounded_total() {
    let mut rng = StdRng::seed_from_u64(7);
    let scale = CurrencyScale::DEFAULT;

    for _ in 0..2_000 {
        let templates = random_percentage_template(&mut rng);
        validate_template(&templates).unwrap();

        let cents: i64 = rng.gen_range(1..10_000_000);
        let total = Decimal::new(cents, 2) + Decimal::new(rng.gen_range(0..10), 3);

        let amounts = calculate_amounts(total, &templates, scale).unwrap();
        let sum: Decimal = amounts.iter().map(|m| m.amount).sum();
        assert_eq!(sum, scale.round(total), "template {templates:?} total {total}");
        assert!(amounts.last().unwrap().is_final);
        assert!(amounts.iter().all(|m| m.amount.scale() <= 2));
    }
}

#[test]
fn test_percentages_must_sum_to_one_hundred() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..500 {
        let mut templates = random_percentage_template(&mut rng);
        let bump = Decimal::from(rng.gen_range(1..5i64));
        let delta = if rng.gen_bool(0.5) {
            bump
        } else {
            -bump.min(templates[0].value - dec!(0.5))
        };
        templates[0].value += delta;
        assert!(validate_template(&templates).is_err());
    }
}

#[test]
fn test_final_marker_rules() {
    let none = vec![
        MilestoneTemplate::percentage(dec!(50), false),
        MilestoneTemplate::percentage(dec!(50), false),
    ];
    let two = vec![
        MilestoneTemplate::percentage(dec!(50), true),
        MilestoneTemplate::percentage(dec!(50), true),
    ];
    let first = vec![
        MilestoneTemplate::percentage(dec!(50), true),
        MilestoneTemplate::percentage(dec!(50), false),
    ];
    for (template, code) in [
        (none, "FINAL_MILESTONE_MISSING"),
        (two, "FINAL_MILESTONE_DUPLICATE"),
        (first, "FINAL_MILESTONE_NOT_LAST"),
    ] {
        assert_eq!(validate_template(&template).unwrap_err().code(), code);
    }
}
