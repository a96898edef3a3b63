//! Interval usage samples and billing periods
//!
//! Meter data enters the engine as a flat slice of interval samples with
//! UTC timestamps. Billing windows are date-granular and inclusive on
//! both ends; which calendar date a sample belongs to is decided in the
//! tariff's time zone, not in UTC.

use crate::error::{ObolError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One interval meter reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    /// Instant the interval was recorded at
    pub timestamp: DateTime<Utc>,

    /// Energy drawn over the interval in kWh
    pub kwh: f64,

    /// Apparent power over the interval in kVA, when the meter reports it
    #[serde(default)]
    pub kva: Option<f64>,
}

impl UsageSample {
    /// Create an energy-only sample
    pub fn new(timestamp: DateTime<Utc>, kwh: f64) -> Self {
        Self {
            timestamp,
            kwh,
            kva: None,
        }
    }

    /// Create a sample carrying an apparent power reading
    pub fn with_kva(timestamp: DateTime<Utc>, kwh: f64, kva: f64) -> Self {
        Self {
            timestamp,
            kwh,
            kva: Some(kva),
        }
    }
}

/// Inclusive calendar window a bill is calculated over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    /// First billed date
    pub start: NaiveDate,

    /// Last billed date
    pub end: NaiveDate,
}

impl BillingPeriod {
    /// Create a period, rejecting windows that end before they start
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(ObolError::schema(format!(
                "billing period ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of calendar days spanned, counting both endpoints
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Whether the given local calendar date falls within the period
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}
