//! Core pricing calculation functions.
//!
//! Pure functions for pricing math - no database access. Safe to call from any
//! number of tasks concurrently.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

use super::models::{PriceTier, TierInput, TierKind};

/// Fraction digits carried by every externally visible money amount
pub const MONEY_SCALE: u32 = 2;

const MINUTES_PER_HOUR: Decimal = dec!(60);

/// Durations shown in the price preview table
pub const PREVIEW_DURATIONS: [i32; 7] = [15, 30, 60, 90, 120, 180, 240];

/// Round to two decimal places, half-up, always carrying exactly two digits.
///
/// # Examples
/// ```
/// use rust_decimal_macros::dec;
/// use studio_billing::pricing::round_money;
///
/// assert_eq!(round_money(dec!(2.345)), dec!(2.35));
/// assert_eq!(round_money(dec!(105)).to_string(), "105.00");
/// ```
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Pro-rate an hourly rate over a number of minutes, unrounded.
fn hourly_amount(rate: Decimal, minutes: i32) -> Decimal {
    rate * Decimal::from(minutes) / MINUTES_PER_HOUR
}

/// Compute the charge for a booking of `duration_minutes`.
///
/// With no tiers the base hourly rate is pro-rated over the whole duration.
/// Otherwise tiers are walked in ascending `from_minutes` order; each one
/// charges for the part of the booking inside `[from_minutes, to_minutes)`.
/// Fixed tiers charge their full rate once any minute lands in them, hourly
/// tiers are pro-rated. Minutes not covered by any tier are free.
///
/// The tier set is trusted to be non-overlapping; it does not need to be sorted.
///
/// # Panics
/// If `duration_minutes` is not positive. Callers validate durations first.
pub fn compute_price(base_rate: Decimal, tiers: &[PriceTier], duration_minutes: i32) -> Decimal {
    assert!(
        duration_minutes > 0,
        "compute_price called with non-positive duration {}",
        duration_minutes
    );

    if tiers.is_empty() {
        return round_money(hourly_amount(base_rate, duration_minutes));
    }

    let mut ordered: Vec<&PriceTier> = tiers.iter().collect();
    ordered.sort_by_key(|t| (t.from_minutes, t.sort_order));

    let mut total = Decimal::ZERO;
    let mut position = 0;

    for tier in ordered {
        let tier_end = tier.to_minutes.unwrap_or(duration_minutes);
        if tier_end <= position {
            continue;
        }

        let consumed_end = tier_end.min(duration_minutes);
        let minutes_in_tier = (consumed_end - tier.from_minutes.max(position)).max(0);
        if minutes_in_tier == 0 {
            continue;
        }

        total += match tier.kind {
            TierKind::Fixed => tier.rate,
            TierKind::Hourly => hourly_amount(tier.rate, minutes_in_tier),
        };

        position = consumed_end;
        if position >= duration_minutes {
            break;
        }
    }

    round_money(total)
}

/// One row of a price preview table
#[derive(Debug, Clone, PartialEq)]
pub struct PricePreview {
    pub duration_minutes: i32,
    pub amount: Decimal,
}

/// Run `compute_price` over the standard preview durations.
pub fn preview_prices(base_rate: Decimal, tiers: &[PriceTier]) -> Vec<PricePreview> {
    PREVIEW_DURATIONS
        .iter()
        .map(|&duration_minutes| PricePreview {
            duration_minutes,
            amount: compute_price(base_rate, tiers, duration_minutes),
        })
        .collect()
}

/// Price of `quantity` units at `unit_rate`
pub fn line_total(unit_rate: Decimal, quantity: i32) -> Decimal {
    round_money(unit_rate * Decimal::from(quantity))
}

/// Why `rate` cannot be stored as a price, if it cannot.
///
/// Rates are kept at the same scale as every frozen amount, so an invoice line
/// can always be recomputed from the rate it records.
pub fn rate_problem(rate: Decimal) -> Option<String> {
    if rate <= Decimal::ZERO {
        Some(format!("rate must be positive (got {})", rate))
    } else if rate.normalize().scale() > MONEY_SCALE {
        Some(format!(
            "rate must have at most {} fraction digits (got {})",
            MONEY_SCALE, rate
        ))
    } else {
        None
    }
}

/// Check tier bounds and rate, returning a description of every problem.
pub fn validate_tier_input(input: &TierInput) -> Vec<String> {
    let mut errors = Vec::new();
    if input.from_minutes < 0 {
        errors.push(format!("from_minutes must be >= 0 (got {})", input.from_minutes));
    }
    if let Some(to) = input.to_minutes {
        if to <= input.from_minutes {
            errors.push(format!(
                "to_minutes must be greater than from_minutes ({} <= {})",
                to, input.from_minutes
            ));
        }
    }
    if let Some(problem) = rate_problem(input.rate) {
        errors.push(problem);
    }
    errors
}

/// Find an existing tier that overlaps `candidate`, ignoring `candidate` itself.
pub fn find_overlap<'a>(candidate: &PriceTier, existing: &'a [PriceTier]) -> Option<&'a PriceTier> {
    existing
        .iter()
        .filter(|t| t.id != candidate.id)
        .find(|t| candidate.overlaps(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn tier(from: i32, to: Option<i32>, kind: TierKind, rate: Decimal) -> PriceTier {
        PriceTier {
            id: Uuid::new_v4(),
            price_id: Uuid::nil(),
            from_minutes: from,
            to_minutes: to,
            kind,
            rate,
            sort_order: 0,
        }
    }

    fn canonical_tiers() -> Vec<PriceTier> {
        vec![
            tier(0, Some(30), TierKind::Fixed, dec!(75.00)),
            tier(30, None, TierKind::Hourly, dec!(120.00)),
        ]
    }

    // ==================== round_money tests ====================

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(dec!(2.345)), dec!(2.35));
        assert_eq!(round_money(dec!(2.355)), dec!(2.36));
        assert_eq!(round_money(dec!(2.344)), dec!(2.34));
        assert_eq!(round_money(dec!(-2.345)), dec!(-2.35));
    }

    #[test]
    fn test_round_money_always_two_digits() {
        assert_eq!(round_money(dec!(105)).to_string(), "105.00");
        assert_eq!(round_money(dec!(17.5)).to_string(), "17.50");
        assert_eq!(round_money(dec!(23.33333333)).to_string(), "23.33");
        assert_eq!(round_money(Decimal::ZERO).scale(), MONEY_SCALE);
    }

    // ==================== compute_price tests ====================

    #[test]
    fn test_no_tiers_prorates_base_rate() {
        assert_eq!(compute_price(dec!(70.00), &[], 15), dec!(17.50));
        assert_eq!(compute_price(dec!(70.00), &[], 30), dec!(35.00));
        assert_eq!(compute_price(dec!(70.00), &[], 90), dec!(105.00));
        assert_eq!(compute_price(dec!(70.00), &[], 120), dec!(140.00));
    }

    #[test]
    fn test_no_tiers_rounds_once_at_the_end() {
        // 70 * 20 / 60 = 23.3333...
        assert_eq!(compute_price(dec!(70.00), &[], 20), dec!(23.33));
        // 50 * 1 / 60 = 0.8333...
        assert_eq!(compute_price(dec!(50.00), &[], 1), dec!(0.83));
        // 0.03 * 50 / 60 = 0.025 -> half-up
        assert_eq!(compute_price(dec!(0.03), &[], 50), dec!(0.03));
    }

    #[test]
    fn test_canonical_tiered_example() {
        let tiers = canonical_tiers();
        assert_eq!(compute_price(dec!(99.00), &tiers, 30), dec!(75.00));
        assert_eq!(compute_price(dec!(99.00), &tiers, 60), dec!(135.00));
        assert_eq!(compute_price(dec!(99.00), &tiers, 90), dec!(195.00));
        assert_eq!(compute_price(dec!(99.00), &tiers, 120), dec!(255.00));
    }

    #[test]
    fn test_base_rate_ignored_when_tiers_present() {
        let tiers = canonical_tiers();
        assert_eq!(
            compute_price(dec!(1.00), &tiers, 90),
            compute_price(dec!(1000.00), &tiers, 90)
        );
    }

    #[test]
    fn test_unsorted_tiers_are_sorted() {
        let mut tiers = canonical_tiers();
        tiers.reverse();
        assert_eq!(compute_price(dec!(0), &tiers, 90), dec!(195.00));
    }

    #[test]
    fn test_fixed_tier_never_prorated() {
        let tiers = vec![tier(0, Some(15), TierKind::Fixed, dec!(20.00))];
        assert_eq!(compute_price(dec!(0), &tiers, 1), dec!(20.00));
        assert_eq!(compute_price(dec!(0), &tiers, 7), dec!(20.00));
        assert_eq!(compute_price(dec!(0), &tiers, 15), dec!(20.00));
        // Minutes past the last tier are free
        assert_eq!(compute_price(dec!(0), &tiers, 45), dec!(20.00));
    }

    #[test]
    fn test_fixed_tier_after_partial_hourly() {
        let tiers = vec![
            tier(0, Some(60), TierKind::Hourly, dec!(60.00)),
            tier(60, Some(120), TierKind::Fixed, dec!(50.00)),
        ];
        assert_eq!(compute_price(dec!(0), &tiers, 45), dec!(45.00));
        assert_eq!(compute_price(dec!(0), &tiers, 61), dec!(110.00));
        assert_eq!(compute_price(dec!(0), &tiers, 120), dec!(110.00));
    }

    #[test]
    fn test_gap_tolerance() {
        let tiers = vec![
            tier(0, Some(180), TierKind::Hourly, dec!(70)),
            tier(180, None, TierKind::Hourly, dec!(60)),
        ];
        assert_eq!(compute_price(dec!(0), &tiers, 120), dec!(140.00));
        assert_eq!(compute_price(dec!(0), &tiers, 180), dec!(210.00));
        assert_eq!(compute_price(dec!(0), &tiers, 300), dec!(330.00));
    }

    #[test]
    fn test_uncovered_leading_minutes_are_free() {
        let tiers = vec![tier(60, None, TierKind::Hourly, dec!(60.00))];
        assert_eq!(compute_price(dec!(100.00), &tiers, 30), dec!(0.00));
        assert_eq!(compute_price(dec!(100.00), &tiers, 60), dec!(0.00));
        assert_eq!(compute_price(dec!(100.00), &tiers, 90), dec!(30.00));
    }

    #[test]
    fn test_gap_between_tiers_is_free() {
        let tiers = vec![
            tier(0, Some(30), TierKind::Hourly, dec!(60.00)),
            tier(60, None, TierKind::Hourly, dec!(60.00)),
        ];
        // 30 minutes charged, 30 free, 30 charged
        assert_eq!(compute_price(dec!(0), &tiers, 90), dec!(60.00));
    }

    #[test]
    fn test_tiers_beyond_duration_ignored() {
        let tiers = vec![
            tier(0, Some(60), TierKind::Hourly, dec!(60.00)),
            tier(240, None, TierKind::Fixed, dec!(500.00)),
        ];
        assert_eq!(compute_price(dec!(0), &tiers, 120), dec!(60.00));
    }

    #[test]
    fn test_hourly_intermediate_precision() {
        // 3 x 20 minute tiers at 70/h: each 23.333..., total 70.00 only if
        // rounding happens once at the end.
        let tiers = vec![
            tier(0, Some(20), TierKind::Hourly, dec!(70)),
            tier(20, Some(40), TierKind::Hourly, dec!(70)),
            tier(40, None, TierKind::Hourly, dec!(70)),
        ];
        assert_eq!(compute_price(dec!(0), &tiers, 60), dec!(70.00));
    }

    #[test]
    fn test_result_has_two_fraction_digits() {
        let tiers = canonical_tiers();
        assert_eq!(compute_price(dec!(0), &tiers, 90).scale(), MONEY_SCALE);
        assert_eq!(compute_price(dec!(70), &[], 60).scale(), MONEY_SCALE);
    }

    #[test]
    #[should_panic(expected = "non-positive duration")]
    fn test_zero_duration_is_a_caller_bug() {
        compute_price(dec!(70.00), &[], 0);
    }

    // ==================== preview / line totals ====================

    #[test]
    fn test_preview_prices() {
        let preview = preview_prices(dec!(70.00), &[]);
        let durations: Vec<i32> = preview.iter().map(|p| p.duration_minutes).collect();
        assert_eq!(durations, PREVIEW_DURATIONS.to_vec());
        assert_eq!(preview[0].amount, dec!(17.50));
        assert_eq!(preview[6].amount, dec!(280.00));

        let tiered = preview_prices(dec!(0), &canonical_tiers());
        assert_eq!(tiered[3].amount, dec!(195.00));
    }

    #[test]
    fn test_line_total_exact() {
        assert_eq!(line_total(dec!(20.00), 2), dec!(40.00));
        assert_eq!(line_total(dec!(20.00), 2).to_string(), "40.00");
        assert_eq!(line_total(dec!(0.33), 3).to_string(), "0.99");
    }

    #[test]
    fn test_rate_problem() {
        assert!(rate_problem(dec!(70.00)).is_none());
        assert!(rate_problem(dec!(70)).is_none());
        assert!(rate_problem(dec!(70.500)).is_none());
        assert!(rate_problem(dec!(0)).is_some());
        assert!(rate_problem(dec!(-5.00)).is_some());
        assert!(rate_problem(dec!(70.005)).is_some());
        assert!(rate_problem(dec!(0.333)).is_some());
    }

    // ==================== tier validation ====================

    #[test]
    fn test_validate_tier_input() {
        let ok = TierInput {
            from_minutes: 0,
            to_minutes: Some(30),
            kind: TierKind::Fixed,
            rate: dec!(75.00),
            sort_order: 0,
        };
        assert!(validate_tier_input(&ok).is_empty());

        let bad = TierInput {
            from_minutes: -5,
            to_minutes: Some(-10),
            kind: TierKind::Hourly,
            rate: dec!(0),
            sort_order: 0,
        };
        assert_eq!(validate_tier_input(&bad).len(), 3);

        let sub_cent = TierInput {
            rate: dec!(75.125),
            ..ok
        };
        assert_eq!(validate_tier_input(&sub_cent).len(), 1);
    }

    #[test]
    fn test_find_overlap_ignores_self() {
        let existing = canonical_tiers();
        let mut edited = existing[1].clone();
        edited.from_minutes = 30;
        edited.to_minutes = Some(90);
        assert!(find_overlap(&edited, &existing).is_none());

        edited.from_minutes = 20;
        let hit = find_overlap(&edited, &existing).map(|t| t.id);
        assert_eq!(hit, Some(existing[0].id));
    }
}
