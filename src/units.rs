//! Rate unit normalization
//!
//! Tariff documents quote rates in mixed units: cents or dollars, per
//! kWh, per day, per kVA per month, per meter per year. Calculations
//! run in dollars, so every rate is normalized before it reaches a
//! formula. Period-denominated rates are prorated to the billing window
//! here; per-day rates are left alone because formulas multiply by
//! `days` themselves.

use crate::error::{ObolError, Result};
use crate::usage::BillingPeriod;
use chrono::{Datelike, NaiveDate};

/// Normalize a quoted rate to dollars for the given billing period
///
/// The unit grammar is `<currency>/<token>[/<token>...]` where the
/// currency is `c` (cents) or `$` (dollars) and tokens are drawn from
/// `kwh`, `kva`, `meter`, `day`, `mth`/`month`, and `year`. Matching is
/// case-insensitive. Monthly rates are prorated by the period length
/// against the calendar month the period starts in; yearly rates are
/// prorated against 365.25 days.
pub fn normalize_rate(value: f64, unit: &str, period: &BillingPeriod) -> Result<f64> {
    let compact = unit.trim().to_ascii_lowercase();
    let mut parts = compact.split('/').map(str::trim);

    let mut rate = match parts.next().unwrap_or("") {
        "c" => value / 100.0,
        "$" => value,
        _ => {
            return Err(ObolError::unit(
                unit.to_string(),
                "unrecognized currency prefix".to_string(),
            ));
        }
    };

    let denominators: Vec<&str> = parts.collect();
    if denominators.is_empty() {
        return Err(ObolError::unit(
            unit.to_string(),
            "missing denominator".to_string(),
        ));
    }

    let days = period.days() as f64;
    for token in denominators {
        match token {
            // Quantity denominators carry no scaling of their own
            "kwh" | "kva" | "meter" | "day" => {}
            "mth" | "month" => {
                rate *= days / days_in_month(period.start);
            }
            "year" => {
                rate *= days / 365.25;
            }
            other => {
                return Err(ObolError::unit(
                    unit.to_string(),
                    format!("unrecognized unit token '{}'", other),
                ));
            }
        }
    }

    Ok(rate)
}

fn days_in_month(date: NaiveDate) -> f64 {
    let days = match date.month() {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if date.leap_year() {
                29
            } else {
                28
            }
        }
    };
    f64::from(days)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(sy: i32, sm: u32, sd: u32, ey: i32, em: u32, ed: u32) -> BillingPeriod {
        BillingPeriod::new(
            NaiveDate::from_ymd_opt(sy, sm, sd).unwrap(),
            NaiveDate::from_ymd_opt(ey, em, ed).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_cents_per_kwh_to_dollars() {
        let july = period(2024, 7, 1, 2024, 7, 31);
        let rate = normalize_rate(30.0, "c/kWh", &july).unwrap();
        assert!((rate - 0.30).abs() < 1e-12);

        let rate = normalize_rate(11.5511, "c/kWh", &july).unwrap();
        assert!((rate - 0.115511).abs() < 1e-12);
    }

    #[test]
    fn test_per_day_rates_pass_through() {
        let july = period(2024, 7, 1, 2024, 7, 31);
        let rate = normalize_rate(110.0, "c/day", &july).unwrap();
        assert!((rate - 1.10).abs() < 1e-12);

        let rate = normalize_rate(1.25, "$/day", &july).unwrap();
        assert!((rate - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_monthly_rates_prorate_against_the_starting_month() {
        let full_july = period(2024, 7, 1, 2024, 7, 31);
        let rate = normalize_rate(15.0, "$/kVA/Mth", &full_july).unwrap();
        assert!((rate - 15.0).abs() < 1e-12);

        let half_july = period(2024, 7, 1, 2024, 7, 15);
        let rate = normalize_rate(15.0, "$/kVA/Mth", &half_july).unwrap();
        assert!((rate - 15.0 * 15.0 / 31.0).abs() < 1e-12);

        // February of a leap year has 29 days
        let feb = period(2024, 2, 1, 2024, 2, 29);
        let rate = normalize_rate(29.0, "$/Mth", &feb).unwrap();
        assert!((rate - 29.0).abs() < 1e-12);
    }

    #[test]
    fn test_yearly_rates_prorate_against_the_average_year() {
        let july = period(2024, 7, 1, 2024, 7, 31);
        let rate = normalize_rate(400.0, "$/meter/year", &july).unwrap();
        assert!((rate - 400.0 * 31.0 / 365.25).abs() < 1e-12);
    }

    #[test]
    fn test_unit_matching_is_case_insensitive() {
        let july = period(2024, 7, 1, 2024, 7, 31);
        let upper = normalize_rate(30.0, "C/KWH", &july).unwrap();
        let lower = normalize_rate(30.0, "c/kwh", &july).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_unrecognized_units_are_rejected() {
        let july = period(2024, 7, 1, 2024, 7, 31);

        let err = normalize_rate(1.0, "c/widget", &july).unwrap_err();
        assert!(matches!(err, ObolError::Unit { .. }));
        assert!(err.to_string().contains("widget"));

        assert!(normalize_rate(1.0, "$", &july).is_err());
        assert!(normalize_rate(1.0, "eur/kwh", &july).is_err());
        assert!(normalize_rate(1.0, "c/", &july).is_err());
        assert!(normalize_rate(1.0, "", &july).is_err());
    }
}
