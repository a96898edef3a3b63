//! Component cost resolution
//!
//! Each tariff component resolves to a rounded currency amount through a
//! fixed pipeline: season gate, tier selection against the quantity named
//! by `applies_to`, unit normalization, formula evaluation, and rounding
//! to whole cents. Tier selection always happens on the quoted rate,
//! before normalization touches it.

use crate::aggregate::{self, UsageAggregates};
use crate::config::DemandConfig;
use crate::error::{ObolError, Result};
use crate::formula::Expr;
use crate::tariff::{Component, RateTier, UsageBasis};
use crate::units;
use crate::usage::{BillingPeriod, UsageSample};
use chrono_tz::Tz;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Variable vocabulary available to component formulas
pub const FORMULA_VARIABLES: [&str; 13] = [
    "total_usage",
    "peak_usage",
    "off_peak_usage",
    "shoulder_usage",
    "network_peak_usage",
    "network_off_peak_usage",
    "network_shoulder_usage",
    "network_total_usage",
    "max_kva",
    "incentive_kva",
    "days",
    "rate",
    "loss_factor",
];

/// Resolve one component to its rounded cost for the billing window
///
/// A component whose season does not overlap the window resolves to
/// 0.00 without evaluating anything. Components with their own rolling
/// window or season re-derive demand figures on that basis; everything
/// else reads the base aggregates.
pub fn resolve_component(
    component: &Component,
    base: &UsageAggregates,
    samples: &[UsageSample],
    period: &BillingPeriod,
    tz: Tz,
    demand: &DemandConfig,
) -> Result<Decimal> {
    if let Some(season) = &component.season {
        if !season.overlaps(period.start, period.end) {
            return Ok(Decimal::ZERO);
        }
    }

    let (max_kva, incentive_kva) = component_demand(component, base, samples, period, tz, demand);

    let basis = tier_basis(component);
    let basis_value = match basis {
        UsageBasis::Demand => max_kva,
        UsageBasis::IncentiveDemand => incentive_kva,
        other => base.basis_value(other),
    };

    let quoted = select_rate(&component.rate_schedule, basis_value);
    let rate = units::normalize_rate(quoted, &component.unit, period)?;

    let mut ctx = base.variables();
    ctx.set("max_kva", max_kva);
    ctx.set("incentive_kva", incentive_kva);
    ctx.set("rate", rate);
    ctx.set("loss_factor", component.loss_factor.unwrap_or(1.0));

    let cost = Expr::parse(&component.calculation)?.evaluate(&ctx)?;
    if !cost.is_finite() {
        return Err(ObolError::formula(format!(
            "component '{}' evaluates to a non-finite amount",
            component.id
        )));
    }

    round_to_cents(cost)
}

/// Round a raw amount to whole cents, halves away from zero
pub fn round_to_cents(amount: f64) -> Result<Decimal> {
    let exact = Decimal::from_f64(amount).ok_or_else(|| {
        ObolError::formula(format!("amount {} is not representable in currency", amount))
    })?;
    Ok(exact.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

fn component_demand(
    component: &Component,
    base: &UsageAggregates,
    samples: &[UsageSample],
    period: &BillingPeriod,
    tz: Tz,
    demand: &DemandConfig,
) -> (f64, f64) {
    if component.rolling_window.is_none() && component.season.is_none() {
        return (base.max_kva, base.incentive_kva);
    }

    let interval = component
        .rolling_window
        .map_or(demand.interval_minutes, |w| w.interval_minutes);
    let months = component.rolling_window.map(|w| w.months);
    let buckets = aggregate::bucket_samples(samples, interval);

    let max_kva =
        aggregate::demand_figure(&buckets, period.end, months, None, tz, demand.aggregation);
    let incentive_kva = match &component.season {
        Some(season) => aggregate::demand_figure(
            &buckets,
            period.end,
            months,
            Some(season),
            tz,
            demand.aggregation,
        ),
        None => max_kva,
    };

    (max_kva, incentive_kva)
}

/// Pick the tier-matching basis from the component's usage tags
fn tier_basis(component: &Component) -> UsageBasis {
    let priority = [
        UsageBasis::Peak,
        UsageBasis::OffPeak,
        UsageBasis::Shoulder,
        UsageBasis::Total,
        UsageBasis::Demand,
        UsageBasis::IncentiveDemand,
        UsageBasis::Days,
    ];
    for basis in priority {
        if component
            .applies_to
            .iter()
            .any(|tag| tag.usage_basis() == basis)
        {
            return basis;
        }
    }
    UsageBasis::Days
}

/// Select the quoted rate for the given basis value
///
/// A single tier is a flat rate. With multiple tiers the first whose
/// `from <= basis < to` holds wins, open bounds matching anything on
/// their side. When nothing matches the last tier applies.
fn select_rate(schedule: &[RateTier], basis: f64) -> f64 {
    if schedule.len() == 1 {
        return schedule[0].value;
    }
    for tier in schedule {
        let lower_ok = tier.from.is_none_or(|from| from <= basis);
        let upper_ok = tier.to.is_none_or(|to| basis < to);
        if lower_ok && upper_ok {
            return tier.value;
        }
    }
    schedule.last().map_or(0.0, |tier| tier.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemandAggregation;
    use crate::tariff::{AppliesTo, ComponentCategory, DateRange, RollingWindow};
    use crate::usage::UsageSample;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn melbourne() -> Tz {
        "Australia/Melbourne".parse().unwrap()
    }

    fn july() -> BillingPeriod {
        BillingPeriod::new(
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 31).unwrap(),
        )
        .unwrap()
    }

    fn flat(value: f64) -> Vec<RateTier> {
        vec![RateTier {
            from: None,
            to: None,
            value,
        }]
    }

    fn energy_component(id: &str, calculation: &str) -> Component {
        Component {
            id: id.to_string(),
            label: String::new(),
            category: ComponentCategory::RetailEnergy,
            unit: "c/kWh".to_string(),
            applies_to: vec![AppliesTo::UsagePeak],
            rate_schedule: flat(30.0),
            loss_factor: None,
            season: None,
            rolling_window: None,
            calculation: calculation.to_string(),
        }
    }

    fn base_aggregates() -> UsageAggregates {
        let mut base = UsageAggregates {
            total_usage: 10.0,
            days: 31,
            max_kva: 5.0,
            incentive_kva: 5.0,
            ..UsageAggregates::default()
        };
        base.band_usage.insert("peak".to_string(), 4.0);
        base.band_usage.insert("offpeak".to_string(), 6.0);
        base
    }

    #[test]
    fn test_energy_component_resolves_and_rounds() {
        let component = energy_component("peak_energy", "peak_usage * rate");
        let cost = resolve_component(
            &component,
            &base_aggregates(),
            &[],
            &july(),
            melbourne(),
            &DemandConfig::default(),
        )
        .unwrap();
        // 4.0 kWh at 30 c/kWh
        assert_eq!(cost, dec!(1.20));
    }

    #[test]
    fn test_loss_factor_defaults_to_one() {
        let mut with_loss = energy_component("peak_energy", "peak_usage * rate * loss_factor");
        let cost_default = resolve_component(
            &with_loss,
            &base_aggregates(),
            &[],
            &july(),
            melbourne(),
            &DemandConfig::default(),
        )
        .unwrap();
        assert_eq!(cost_default, dec!(1.20));

        with_loss.loss_factor = Some(1.1);
        let cost_scaled = resolve_component(
            &with_loss,
            &base_aggregates(),
            &[],
            &july(),
            melbourne(),
            &DemandConfig::default(),
        )
        .unwrap();
        assert_eq!(cost_scaled, dec!(1.32));
    }

    #[test]
    fn test_out_of_season_component_is_zero() {
        let mut component = energy_component("summer_energy", "peak_usage * rate");
        component.season = Some(DateRange {
            from: NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        });
        let cost = resolve_component(
            &component,
            &base_aggregates(),
            &[],
            &july(),
            melbourne(),
            &DemandConfig::default(),
        )
        .unwrap();
        assert_eq!(cost, Decimal::ZERO);
    }

    #[test]
    fn test_tier_selection_on_quoted_rates() {
        let schedule = vec![
            RateTier {
                from: None,
                to: Some(100.0),
                value: 28.0,
            },
            RateTier {
                from: Some(100.0),
                to: Some(200.0),
                value: 25.0,
            },
            RateTier {
                from: Some(200.0),
                to: None,
                value: 22.0,
            },
        ];
        assert_eq!(select_rate(&schedule, 50.0), 28.0);
        // Tier bounds are half-open
        assert_eq!(select_rate(&schedule, 100.0), 25.0);
        assert_eq!(select_rate(&schedule, 199.9), 25.0);
        assert_eq!(select_rate(&schedule, 200.0), 22.0);
        assert_eq!(select_rate(&schedule, 5000.0), 22.0);
    }

    #[test]
    fn test_tier_fallback_to_last_when_nothing_matches() {
        let schedule = vec![
            RateTier {
                from: Some(0.0),
                to: Some(10.0),
                value: 30.0,
            },
            RateTier {
                from: Some(10.0),
                to: Some(20.0),
                value: 27.0,
            },
        ];
        assert_eq!(select_rate(&schedule, 25.0), 27.0);
        assert_eq!(select_rate(&schedule, -1.0), 27.0);
    }

    #[test]
    fn test_single_tier_matches_regardless_of_basis() {
        assert_eq!(select_rate(&flat(30.0), 0.0), 30.0);
        assert_eq!(select_rate(&flat(30.0), 1e9), 30.0);
    }

    #[test]
    fn test_rounding_half_away_from_zero() {
        assert_eq!(round_to_cents(0.125).unwrap(), dec!(0.13));
        assert_eq!(round_to_cents(0.1549).unwrap(), dec!(0.15));
        assert_eq!(round_to_cents(-0.125).unwrap(), dec!(-0.13));
        assert_eq!(round_to_cents(10.0).unwrap(), dec!(10.00));
    }

    #[test]
    fn test_demand_component_uses_its_rolling_window() {
        let mut component = energy_component("demand", "max_kva * rate * days");
        component.unit = "$/kVA/Mth".to_string();
        component.applies_to = vec![AppliesTo::Demand];
        component.rate_schedule = flat(0.30);
        component.rolling_window = Some(RollingWindow {
            months: 12,
            interval_minutes: 30,
        });
        component.calculation = "max_kva * rate".to_string();

        let samples = vec![
            UsageSample::with_kva(Utc.with_ymd_and_hms(2023, 5, 10, 8, 0, 0).unwrap(), 0.0, 9.5),
            UsageSample::with_kva(Utc.with_ymd_and_hms(2024, 7, 10, 8, 0, 0).unwrap(), 0.0, 6.0),
        ];
        // Base figures deliberately disagree so the recompute is observable
        let mut base = base_aggregates();
        base.max_kva = 99.0;
        base.incentive_kva = 99.0;

        let cost = resolve_component(
            &component,
            &base,
            &samples,
            &july(),
            melbourne(),
            &DemandConfig::default(),
        )
        .unwrap();
        // 6.0 kVA (the 2023 reading is outside twelve months) at $0.30
        assert_eq!(cost, dec!(1.80));
    }

    #[test]
    fn test_incentive_demand_narrows_to_season() {
        let mut component = energy_component("incentive", "incentive_kva * rate");
        component.unit = "$/kVA".to_string();
        component.applies_to = vec![AppliesTo::IncentiveDemand];
        component.rate_schedule = flat(1.0);
        component.season = Some(DateRange {
            from: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2024, 8, 31).unwrap(),
        });

        let samples = vec![
            UsageSample::with_kva(Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap(), 0.0, 9.0),
            UsageSample::with_kva(Utc.with_ymd_and_hms(2024, 7, 10, 8, 0, 0).unwrap(), 0.0, 6.0),
        ];
        let cost = resolve_component(
            &component,
            &base_aggregates(),
            &samples,
            &july(),
            melbourne(),
            &DemandConfig {
                interval_minutes: 30,
                aggregation: DemandAggregation::Max,
            },
        )
        .unwrap();
        assert_eq!(cost, dec!(6.00));
    }

    #[test]
    fn test_non_finite_amounts_are_rejected() {
        let mut component = energy_component("broken", "rate * rate");
        component.unit = "$/kWh".to_string();
        component.rate_schedule = flat(1e308);
        let err = resolve_component(
            &component,
            &base_aggregates(),
            &[],
            &july(),
            melbourne(),
            &DemandConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ObolError::Formula { .. }));
    }

    #[test]
    fn test_daily_supply_charge() {
        let mut component = energy_component("supply", "rate * days");
        component.unit = "c/day".to_string();
        component.applies_to = vec![AppliesTo::Fixed];
        component.category = ComponentCategory::Fixed;
        component.rate_schedule = flat(110.0);
        let cost = resolve_component(
            &component,
            &base_aggregates(),
            &[],
            &july(),
            melbourne(),
            &DemandConfig::default(),
        )
        .unwrap();
        // 31 days at $1.10
        assert_eq!(cost, dec!(34.10));
    }
}
