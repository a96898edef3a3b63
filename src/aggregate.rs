//! Usage aggregation
//!
//! Samples are folded into fixed-width buckets by truncating their
//! timestamps to the bucketing interval. Energy sums within a bucket;
//! apparent power takes the bucket maximum. Band attribution and window
//! membership are decided per bucket on the tariff's local calendar.
//! Demand figures may draw on history before the billed window, so
//! bucketing runs over everything supplied while energy totals only
//! count buckets whose local date falls inside the window.

use crate::config::{DemandAggregation, DemandConfig};
use crate::error::Result;
use crate::formula::VariableContext;
use crate::tariff::{DateRange, TariffDefinition, UsageBasis};
use crate::timeband;
use crate::usage::{BillingPeriod, UsageSample};
use chrono::{DateTime, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap};

/// A fixed-width bucket of usage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageBucket {
    /// Bucket start instant
    pub start: DateTime<Utc>,

    /// Energy summed over the bucket in kWh
    pub kwh: f64,

    /// Maximum apparent power seen in the bucket in kVA
    pub kva: Option<f64>,
}

/// Aggregate figures for a billing window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageAggregates {
    /// Energy over the window in kWh, banded or not
    pub total_usage: f64,

    /// Energy by matched band id in kWh
    pub band_usage: HashMap<String, f64>,

    /// Demand figure over the supplied history in kVA
    pub max_kva: f64,

    /// Incentive demand figure in kVA; equals `max_kva` until a
    /// component narrows it to a season
    pub incentive_kva: f64,

    /// Calendar days spanned by the window
    pub days: i64,
}

impl UsageAggregates {
    /// Banded energy for the given band id, 0.0 when the band never matched
    pub fn band(&self, id: &str) -> f64 {
        self.band_usage.get(id).copied().unwrap_or(0.0)
    }

    fn off_peak(&self) -> f64 {
        if self.band_usage.contains_key("off_peak") {
            self.band("off_peak")
        } else {
            self.band("offpeak")
        }
    }

    /// Aggregate quantity for a tier-matching basis
    pub fn basis_value(&self, basis: UsageBasis) -> f64 {
        match basis {
            UsageBasis::Peak => self.band("peak"),
            UsageBasis::OffPeak => self.off_peak(),
            UsageBasis::Shoulder => self.band("shoulder"),
            UsageBasis::Total => self.total_usage,
            UsageBasis::Demand => self.max_kva,
            UsageBasis::IncentiveDemand => self.incentive_kva,
            UsageBasis::Days => self.days as f64,
        }
    }

    /// Build the formula variable bindings for these aggregates
    pub fn variables(&self) -> VariableContext {
        let peak = self.band("peak");
        let off_peak = self.off_peak();
        let shoulder = self.band("shoulder");

        let mut ctx = VariableContext::new();
        ctx.set("total_usage", self.total_usage);
        ctx.set("peak_usage", peak);
        ctx.set("off_peak_usage", off_peak);
        ctx.set("shoulder_usage", shoulder);
        // Network charges bill against the same metered quantities
        ctx.set("network_peak_usage", peak);
        ctx.set("network_off_peak_usage", off_peak);
        ctx.set("network_shoulder_usage", shoulder);
        ctx.set("network_total_usage", self.total_usage);
        ctx.set("max_kva", self.max_kva);
        ctx.set("incentive_kva", self.incentive_kva);
        ctx.set("days", self.days as f64);
        ctx
    }
}

/// Fold samples into fixed-width buckets, ordered by bucket start
pub fn bucket_samples(samples: &[UsageSample], interval_minutes: u32) -> Vec<UsageBucket> {
    let width = i64::from(interval_minutes) * 60;
    let mut slots: BTreeMap<i64, (f64, Option<f64>)> = BTreeMap::new();

    for sample in samples {
        let slot = sample.timestamp.timestamp().div_euclid(width);
        let entry = slots.entry(slot).or_insert((0.0, None));
        entry.0 += sample.kwh;
        if let Some(kva) = sample.kva {
            entry.1 = Some(entry.1.map_or(kva, |current: f64| current.max(kva)));
        }
    }

    slots
        .into_iter()
        .filter_map(|(slot, (kwh, kva))| {
            DateTime::<Utc>::from_timestamp(slot * width, 0)
                .map(|start| UsageBucket { start, kwh, kva })
        })
        .collect()
}

/// Build the base aggregates for a billing window
///
/// Energy totals count only buckets whose local calendar date falls
/// inside the window. The demand figure runs over all supplied history
/// up to the window end.
pub fn aggregate(
    samples: &[UsageSample],
    tariff: &TariffDefinition,
    period: &BillingPeriod,
    demand: &DemandConfig,
) -> Result<UsageAggregates> {
    let tz = timeband::resolve_timezone(&tariff.time_zone)?;
    let buckets = bucket_samples(samples, demand.interval_minutes);

    let mut total_usage = 0.0;
    let mut band_usage: HashMap<String, f64> = HashMap::new();

    for bucket in &buckets {
        let local_date = bucket.start.with_timezone(&tz).date_naive();
        if !period.contains(local_date) {
            continue;
        }
        total_usage += bucket.kwh;
        if let Some(band_id) = timeband::assign_band(bucket.start, &tariff.time_bands, tz) {
            *band_usage.entry(band_id.to_string()).or_insert(0.0) += bucket.kwh;
        }
    }

    let max_kva = demand_figure(&buckets, period.end, None, None, tz, demand.aggregation);

    Ok(UsageAggregates {
        total_usage,
        band_usage,
        max_kva,
        incentive_kva: max_kva,
        days: period.days(),
    })
}

/// Derive a demand figure from bucketed apparent power readings
///
/// Buckets after `window_end` never count. `trailing_months` narrows the
/// lookback to the months leading up to the window end; `season` further
/// restricts to local dates inside the given window. Buckets without a
/// kVA reading are skipped. No qualifying reading yields 0.0.
pub fn demand_figure(
    buckets: &[UsageBucket],
    window_end: NaiveDate,
    trailing_months: Option<u32>,
    season: Option<&DateRange>,
    tz: Tz,
    aggregation: DemandAggregation,
) -> f64 {
    let cutoff = trailing_months.and_then(|m| window_end.checked_sub_months(Months::new(m)));

    let mut values = Vec::new();
    for bucket in buckets {
        if let Some(kva) = bucket.kva {
            let local_date = bucket.start.with_timezone(&tz).date_naive();
            if local_date > window_end {
                continue;
            }
            if let Some(cutoff) = cutoff {
                if local_date <= cutoff {
                    continue;
                }
            }
            if let Some(season) = season {
                if !season.contains(local_date) {
                    continue;
                }
            }
            values.push(kva);
        }
    }

    match aggregation {
        DemandAggregation::Max => values.into_iter().fold(0.0, f64::max),
        DemandAggregation::Mean => {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        }
    }
}
