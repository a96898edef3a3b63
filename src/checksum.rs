//! Input fingerprinting
//!
//! Every calculation is keyed by a SHA-256 fingerprint over its inputs:
//! the tariff document version, the customer, the billing window, and
//! the usage samples. Samples are brought into a canonical order before
//! hashing, so the same set of readings fingerprints identically no
//! matter how the caller happened to order them. The fingerprint is
//! what the result store deduplicates on.

use crate::usage::{BillingPeriod, UsageSample};
use chrono::SecondsFormat;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

/// Compute the canonical fingerprint of a calculation's inputs
pub fn fingerprint(
    tariff_version_id: &str,
    customer_id: &str,
    period: &BillingPeriod,
    samples: &[UsageSample],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"tariff_version=");
    hasher.update(tariff_version_id.as_bytes());
    hasher.update(b"\ncustomer=");
    hasher.update(customer_id.as_bytes());
    hasher.update(b"\nwindow=");
    hasher.update(period.start.to_string().as_bytes());
    hasher.update(b"..");
    hasher.update(period.end.to_string().as_bytes());
    hasher.update(b"\n");

    let mut ordered: Vec<&UsageSample> = samples.iter().collect();
    ordered.sort_by(|a, b| canonical_order(a, b));

    for sample in ordered {
        let timestamp = sample.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        let kva = match sample.kva {
            Some(value) => value.to_string(),
            None => "-".to_string(),
        };
        hasher.update(format!("ts={};kwh={};kva={}\n", timestamp, sample.kwh, kva).as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

fn canonical_order(a: &UsageSample, b: &UsageSample) -> Ordering {
    a.timestamp
        .cmp(&b.timestamp)
        .then_with(|| a.kwh.total_cmp(&b.kwh))
        .then_with(|| match (a.kva, b.kva) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.total_cmp(&y),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn period() -> BillingPeriod {
        BillingPeriod::new(
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 31).unwrap(),
        )
        .unwrap()
    }

    fn samples() -> Vec<UsageSample> {
        vec![
            UsageSample::new(Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap(), 0.5),
            UsageSample::with_kva(Utc.with_ymd_and_hms(2024, 7, 1, 10, 30, 0).unwrap(), 0.4, 2.5),
            UsageSample::new(Utc.with_ymd_and_hms(2024, 7, 2, 10, 0, 0).unwrap(), 0.3),
        ]
    }

    #[test]
    fn test_fingerprint_ignores_sample_order() {
        let forward = samples();
        let mut reversed = samples();
        reversed.reverse();

        let a = fingerprint("acme/tou/v3", "cust-1", &period(), &forward);
        let b = fingerprint("acme/tou/v3", "cust-1", &period(), &reversed);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_is_a_hex_digest() {
        let digest = fingerprint("acme/tou/v3", "cust-1", &period(), &samples());
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_changes_with_any_input() {
        let base = fingerprint("acme/tou/v3", "cust-1", &period(), &samples());

        let other_version = fingerprint("acme/tou/v4", "cust-1", &period(), &samples());
        assert_ne!(base, other_version);

        let other_customer = fingerprint("acme/tou/v3", "cust-2", &period(), &samples());
        assert_ne!(base, other_customer);

        let other_period = BillingPeriod::new(
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 30).unwrap(),
        )
        .unwrap();
        let shorter = fingerprint("acme/tou/v3", "cust-1", &other_period, &samples());
        assert_ne!(base, shorter);

        let mut tweaked = samples();
        tweaked[0].kwh = 0.51;
        let other_usage = fingerprint("acme/tou/v3", "cust-1", &period(), &tweaked);
        assert_ne!(base, other_usage);
    }

    #[test]
    fn test_missing_kva_differs_from_zero_kva() {
        let ts = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap();
        let without = vec![UsageSample::new(ts, 0.5)];
        let with_zero = vec![UsageSample::with_kva(ts, 0.5, 0.0)];

        let a = fingerprint("acme/tou/v3", "cust-1", &period(), &without);
        let b = fingerprint("acme/tou/v3", "cust-1", &period(), &with_zero);
        assert_ne!(a, b);
    }

    #[test]
    fn test_duplicate_samples_change_the_fingerprint() {
        let single = samples();
        let mut doubled = samples();
        doubled.push(single[0]);

        let a = fingerprint("acme/tou/v3", "cust-1", &period(), &single);
        let b = fingerprint("acme/tou/v3", "cust-1", &period(), &doubled);
        assert_ne!(a, b);
    }
}
