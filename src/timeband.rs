//! Time-of-use band classification
//!
//! Each usage instant is assigned to at most one of the tariff's time
//! bands. Matching happens on the wall clock of the tariff's time zone:
//! a band matches when its date ranges (if any), weekday tokens, and
//! half-open clock ranges all cover the local instant. Bands are tried
//! in declaration order and the first match wins. An instant no band
//! covers is unbanded rather than defaulted.

use crate::error::{ObolError, Result};
use crate::tariff::{DayToken, TimeBand};
use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

/// Resolve an IANA time zone name
pub fn resolve_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>().map_err(|_| ObolError::timezone(name))
}

/// Assign a usage instant to the first matching band, if any
pub fn assign_band<'a>(
    instant: DateTime<Utc>,
    bands: &'a [TimeBand],
    tz: Tz,
) -> Option<&'a str> {
    let local = instant.with_timezone(&tz);
    let date = local.date_naive();
    let day = DayToken::from(chrono::Datelike::weekday(&local));
    let minutes = (local.hour() * 60 + local.minute()) as u16;

    for band in bands {
        if !band.date_ranges.is_empty() && !band.date_ranges.iter().any(|r| r.contains(date)) {
            continue;
        }
        if !(band.days.contains(&DayToken::All) || band.days.contains(&day)) {
            continue;
        }
        if band.times.iter().any(|range| range.contains(minutes)) {
            return Some(band.id.as_str());
        }
    }

    None
}
