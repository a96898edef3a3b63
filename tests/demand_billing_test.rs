use chrono::{NaiveDate, TimeZone, Utc};
use obol::config::{DemandAggregation, EngineConfig};
use obol::engine::BillingEngine;
use obol::tariff::TariffDefinition;
use obol::usage::{BillingPeriod, UsageSample};
use rust_decimal_macros::dec;

fn demand_tariff(unit: &str, rate: f64, calculation: &str) -> TariffDefinition {
    let tariff = TariffDefinition::from_json(&format!(
        r#"{{
            "provider": "gridco",
            "code": "biz_demand_200",
            "version": 1,
            "time_zone": "Australia/Melbourne",
            "components": [
                {{
                    "id": "demand",
                    "category": "demand",
                    "unit": "{unit}",
                    "applies_to": ["demand"],
                    "rate_schedule": [{{"value": {rate}}}],
                    "rolling_window": {{"months": 12}},
                    "calculation": "{calculation}"
                }}
            ]
        }}"#
    ))
    .unwrap();
    tariff.validate().unwrap();
    tariff
}

fn july_2024() -> BillingPeriod {
    BillingPeriod::new(
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 7, 31).unwrap(),
    )
    .unwrap()
}

fn kva(y: i32, mo: u32, d: u32, value: f64) -> UsageSample {
    UsageSample::with_kva(Utc.with_ymd_and_hms(y, mo, d, 8, 0, 0).unwrap(), 0.0, value)
}

#[test]
fn rolling_demand_bills_the_maximum_from_prior_months() {
    let tariff = demand_tariff("$/kVA/Mth", 14.0, "max_kva * rate");
    let samples = vec![kva(2024, 3, 10, 9.0), kva(2024, 7, 10, 6.5)];

    let engine = BillingEngine::with_defaults();
    let result = engine
        .calculate(&tariff, &samples, &july_2024(), "site-1")
        .unwrap();

    // March still sits inside the twelve-month lookback
    assert_eq!(result.total_cost, dec!(126.00));
}

#[test]
fn readings_older_than_the_window_are_ignored() {
    let tariff = demand_tariff("$/kVA/Mth", 14.0, "max_kva * rate");
    let samples = vec![
        kva(2023, 6, 15, 99.0),
        kva(2024, 3, 10, 9.0),
        kva(2024, 7, 10, 6.5),
    ];

    let engine = BillingEngine::with_defaults();
    let result = engine
        .calculate(&tariff, &samples, &july_2024(), "site-1")
        .unwrap();

    assert_eq!(result.total_cost, dec!(126.00));
}

#[test]
fn quarterly_window_prorates_monthly_demand_rates() {
    let tariff = demand_tariff("$/kVA/Mth", 10.0, "max_kva * rate");
    let quarter = BillingPeriod::new(
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 9, 30).unwrap(),
    )
    .unwrap();
    let samples = vec![kva(2024, 8, 10, 5.0)];

    let engine = BillingEngine::with_defaults();
    let result = engine
        .calculate(&tariff, &samples, &quarter, "site-1")
        .unwrap();

    // 92 days against the 31-day starting month: 10 * 92/31 * 5 kVA
    assert_eq!(result.total_cost, dec!(148.39));
}

#[test]
fn annual_charges_prorate_by_calendar_days() {
    let tariff = TariffDefinition::from_json(
        r#"{
            "provider": "gridco",
            "code": "biz_demand_200",
            "version": 1,
            "time_zone": "Australia/Melbourne",
            "components": [
                {
                    "id": "meter_rental",
                    "category": "metering",
                    "unit": "$/meter/year",
                    "applies_to": ["metering"],
                    "rate_schedule": [{"value": 120.0}],
                    "calculation": "rate"
                }
            ]
        }"#,
    )
    .unwrap();

    let engine = BillingEngine::with_defaults();
    let result = engine
        .calculate(&tariff, &[], &july_2024(), "site-1")
        .unwrap();

    // 120 * 31/365.25
    assert_eq!(result.total_cost, dec!(10.18));
}

#[test]
fn mean_aggregation_is_an_engine_setting() {
    let tariff = TariffDefinition::from_json(
        r#"{
            "provider": "gridco",
            "code": "biz_demand_200",
            "version": 1,
            "time_zone": "Australia/Melbourne",
            "components": [
                {
                    "id": "demand",
                    "category": "demand",
                    "unit": "$/kVA",
                    "applies_to": ["demand"],
                    "rate_schedule": [{"value": 2.0}],
                    "calculation": "max_kva * rate"
                }
            ]
        }"#,
    )
    .unwrap();
    let samples = vec![kva(2024, 7, 10, 4.0), kva(2024, 7, 11, 8.0)];

    let mut settings = EngineConfig::default();
    settings.demand.aggregation = DemandAggregation::Mean;
    let engine = BillingEngine::new(settings);
    let result = engine
        .calculate(&tariff, &samples, &july_2024(), "site-1")
        .unwrap();

    assert_eq!(result.total_cost, dec!(12.00));

    let engine = BillingEngine::with_defaults();
    let result = engine
        .calculate(&tariff, &samples, &july_2024(), "site-1")
        .unwrap();
    assert_eq!(result.total_cost, dec!(16.00));
}

#[test]
fn tiered_demand_rates_select_on_the_quoted_figure() {
    let tariff = TariffDefinition::from_json(
        r#"{
            "provider": "gridco",
            "code": "biz_demand_200",
            "version": 1,
            "time_zone": "Australia/Melbourne",
            "components": [
                {
                    "id": "demand",
                    "category": "demand",
                    "unit": "$/kVA",
                    "applies_to": ["demand"],
                    "rate_schedule": [
                        {"to": 50.0, "value": 12.0},
                        {"from": 50.0, "value": 9.0}
                    ],
                    "calculation": "max_kva * rate"
                }
            ]
        }"#,
    )
    .unwrap();

    let engine = BillingEngine::with_defaults();

    let small = vec![kva(2024, 7, 10, 40.0)];
    let result = engine
        .calculate(&tariff, &small, &july_2024(), "site-1")
        .unwrap();
    assert_eq!(result.total_cost, dec!(480.00));

    let large = vec![kva(2024, 7, 10, 60.0)];
    let result = engine
        .calculate(&tariff, &large, &july_2024(), "site-1")
        .unwrap();
    assert_eq!(result.total_cost, dec!(540.00));
}
