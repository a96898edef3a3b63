//! Tariff document model
//!
//! This module defines the versioned tariff structure the engine bills
//! against: time-of-use band declarations, priced components with their
//! rate schedules, and the validation rules a document must satisfy
//! before any calculation runs.

use crate::error::{ObolError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Tariff document schema version accepted by this engine
pub const SCHEMA_VERSION: u32 = 1;

/// A complete versioned tariff document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffDefinition {
    /// Retailer or network operator that issued the tariff
    pub provider: String,

    /// Provider-scoped tariff code
    pub code: String,

    /// Monotonically increasing document version
    pub version: u32,

    /// Document schema version; only [`SCHEMA_VERSION`] is accepted
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Date window in which the tariff may be applied
    #[serde(default)]
    pub effective: Option<DateRange>,

    /// IANA time zone all clock and calendar rules are interpreted in
    #[serde(alias = "time_zones")]
    pub time_zone: String,

    /// Time-of-use band declarations, in priority order
    #[serde(default)]
    pub time_bands: Vec<TimeBand>,

    /// Priced components making up the bill
    pub components: Vec<Component>,
}

/// A named time-of-use band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBand {
    /// Band identifier referenced by usage variables (e.g. "peak")
    pub id: String,

    /// Human-readable band name
    #[serde(default)]
    pub label: String,

    /// Weekdays the band covers, or [`DayToken::All`]
    pub days: Vec<DayToken>,

    /// Clock ranges the band covers, half-open `[from, to)`
    pub times: Vec<ClockRange>,

    /// Calendar windows the band is restricted to; empty means year-round
    #[serde(default)]
    pub date_ranges: Vec<DateRange>,
}

/// A priced line item within a tariff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// Component identifier, unique within the tariff
    pub id: String,

    /// Human-readable component name
    #[serde(default)]
    pub label: String,

    /// Classification of the line item; drives no arithmetic
    pub category: ComponentCategory,

    /// Rate unit, e.g. "c/kWh", "$/day", "$/kVA/Mth"
    pub unit: String,

    /// Usage tags naming the quantity the rate applies to
    #[serde(default)]
    pub applies_to: Vec<AppliesTo>,

    /// Tiered rate schedule; a single untiered entry is the common case
    pub rate_schedule: Vec<RateTier>,

    /// Loss factor multiplier exposed to formulas; defaults to 1.0
    #[serde(default)]
    pub loss_factor: Option<f64>,

    /// Calendar window outside which the component contributes 0.00
    #[serde(default)]
    pub season: Option<DateRange>,

    /// Demand lookback configuration for rolling maximum charges
    #[serde(default)]
    pub rolling_window: Option<RollingWindow>,

    /// Cost formula over the billing variable vocabulary
    pub calculation: String,
}

/// One entry of a tiered rate schedule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateTier {
    /// Inclusive lower bound on the tier basis; open when absent
    #[serde(default)]
    pub from: Option<f64>,

    /// Exclusive upper bound on the tier basis; open when absent
    #[serde(default)]
    pub to: Option<f64>,

    /// Rate value in the component's declared unit
    pub value: f64,
}

/// Demand lookback configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingWindow {
    /// Trailing months of history the demand figure may draw on
    pub months: u32,

    /// Bucketing interval used when deriving the demand figure
    #[serde(default = "default_demand_interval")]
    pub interval_minutes: u32,
}

/// Inclusive calendar date window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First date of the window
    pub from: NaiveDate,

    /// Last date of the window
    pub to: NaiveDate,
}

impl DateRange {
    /// Whether the window contains the given date
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Whether the window overlaps the inclusive date span `start..=end`
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.from <= end && start <= self.to
    }
}

/// Half-open local clock range `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockRange {
    /// Inclusive start of the range
    pub from: ClockTime,

    /// Exclusive end of the range; "24:00" covers through midnight
    pub to: ClockTime,
}

impl ClockRange {
    /// Whether the range contains the given minutes-since-midnight value
    pub fn contains(&self, minutes_since_midnight: u16) -> bool {
        self.from.minutes() <= minutes_since_midnight
            && minutes_since_midnight < self.to.minutes()
    }
}

/// Wall-clock time of day, serialized as "HH:MM"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    /// Minutes since local midnight, 0 through 1440
    pub fn minutes(self) -> u16 {
        self.minutes
    }
}

impl FromStr for ClockTime {
    type Err = ObolError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ObolError::schema(format!("invalid clock time '{}'", s));
        let (hour_str, minute_str) = s.split_once(':').ok_or_else(invalid)?;
        let hour: u16 = hour_str.parse().map_err(|_| invalid())?;
        let minute: u16 = minute_str.parse().map_err(|_| invalid())?;
        if minute > 59 || hour > 24 || (hour == 24 && minute != 0) {
            return Err(invalid());
        }
        Ok(ClockTime {
            minutes: hour * 60 + minute,
        })
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes / 60, self.minutes % 60)
    }
}

impl Serialize for ClockTime {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Weekday token used in band declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayToken {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
    /// Matches every weekday
    All,
}

impl From<chrono::Weekday> for DayToken {
    fn from(weekday: chrono::Weekday) -> Self {
        match weekday {
            chrono::Weekday::Mon => DayToken::Mon,
            chrono::Weekday::Tue => DayToken::Tue,
            chrono::Weekday::Wed => DayToken::Wed,
            chrono::Weekday::Thu => DayToken::Thu,
            chrono::Weekday::Fri => DayToken::Fri,
            chrono::Weekday::Sat => DayToken::Sat,
            chrono::Weekday::Sun => DayToken::Sun,
        }
    }
}

/// Component classification vocabulary
///
/// Known tokens map to their variants; any other token is carried as
/// [`ComponentCategory::Extension`] and validated against the extension
/// shape when the tariff document is validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentCategory {
    RetailEnergy,
    NetworkEnergy,
    Demand,
    IncentiveDemand,
    Environment,
    Fixed,
    Ancillary,
    Metering,
    /// Provider-specific category outside the closed vocabulary
    Extension(String),
}

impl ComponentCategory {
    /// Category token as written in tariff documents
    pub fn as_str(&self) -> &str {
        match self {
            ComponentCategory::RetailEnergy => "retail_energy",
            ComponentCategory::NetworkEnergy => "network_energy",
            ComponentCategory::Demand => "demand",
            ComponentCategory::IncentiveDemand => "incentive_demand",
            ComponentCategory::Environment => "environment",
            ComponentCategory::Fixed => "fixed",
            ComponentCategory::Ancillary => "ancillary",
            ComponentCategory::Metering => "metering",
            ComponentCategory::Extension(token) => token,
        }
    }

    fn from_token(token: &str) -> Self {
        match token {
            "retail_energy" => ComponentCategory::RetailEnergy,
            "network_energy" => ComponentCategory::NetworkEnergy,
            "demand" => ComponentCategory::Demand,
            "incentive_demand" => ComponentCategory::IncentiveDemand,
            "environment" => ComponentCategory::Environment,
            "fixed" => ComponentCategory::Fixed,
            "ancillary" => ComponentCategory::Ancillary,
            "metering" => ComponentCategory::Metering,
            other => ComponentCategory::Extension(other.to_string()),
        }
    }

    fn is_valid_extension_token(token: &str) -> bool {
        let mut chars = token.chars();
        match chars.next() {
            Some(c) if c.is_ascii_lowercase() => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }
}

impl Serialize for ComponentCategory {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ComponentCategory {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        Ok(ComponentCategory::from_token(&token))
    }
}

/// Usage tag naming the quantity a component's rate applies to
///
/// Aliases cover tag spellings found in historical tariff documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliesTo {
    UsagePeak,
    #[serde(alias = "usage_off_peak")]
    UsageOffpeak,
    UsageShoulder,
    #[serde(alias = "usage_all", alias = "total_usage")]
    UsageTotal,
    NetworkPeak,
    #[serde(alias = "network_off_peak")]
    NetworkOffpeak,
    NetworkShoulder,
    #[serde(alias = "network_all")]
    NetworkTotal,
    Demand,
    IncentiveDemand,
    Fixed,
    #[serde(alias = "metering")]
    Meter,
    Ancillary,
}

impl AppliesTo {
    /// The aggregate quantity used as the tier-matching basis for this tag
    pub fn usage_basis(self) -> UsageBasis {
        match self {
            AppliesTo::UsagePeak | AppliesTo::NetworkPeak => UsageBasis::Peak,
            AppliesTo::UsageOffpeak | AppliesTo::NetworkOffpeak => UsageBasis::OffPeak,
            AppliesTo::UsageShoulder | AppliesTo::NetworkShoulder => UsageBasis::Shoulder,
            AppliesTo::UsageTotal | AppliesTo::NetworkTotal => UsageBasis::Total,
            AppliesTo::Demand => UsageBasis::Demand,
            AppliesTo::IncentiveDemand => UsageBasis::IncentiveDemand,
            AppliesTo::Fixed | AppliesTo::Meter | AppliesTo::Ancillary => UsageBasis::Days,
        }
    }
}

/// Aggregate quantity a rate tier is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageBasis {
    Peak,
    OffPeak,
    Shoulder,
    Total,
    Demand,
    IncentiveDemand,
    Days,
}

impl TariffDefinition {
    /// Stable identity of this tariff document version
    ///
    /// Two calculations agree on their result fingerprint only when they
    /// ran against the same version id.
    pub fn version_id(&self) -> String {
        format!("{}/{}/v{}", self.provider, self.code, self.version)
    }

    /// Parse a tariff document from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let tariff: TariffDefinition = serde_json::from_str(content)?;
        Ok(tariff)
    }

    /// Load a tariff document from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ObolError::io(format!(
                "Tariff file not found: {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Validate the document against the structural rules of the schema
    ///
    /// Checks identity fields, time zone resolvability, band and component
    /// id uniqueness, clock and date range ordering, rate schedules, and
    /// that every calculation formula parses and references only known
    /// variables.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ObolError::schema(format!(
                "unsupported schema_version {} (expected {})",
                self.schema_version, SCHEMA_VERSION
            )));
        }
        if self.provider.trim().is_empty() {
            return Err(ObolError::schema("provider must not be empty"));
        }
        if self.code.trim().is_empty() {
            return Err(ObolError::schema("code must not be empty"));
        }

        crate::timeband::resolve_timezone(&self.time_zone)?;

        if let Some(effective) = &self.effective {
            if effective.from > effective.to {
                return Err(ObolError::schema(
                    "effective window must not end before it starts",
                ));
            }
        }

        let mut band_ids = HashSet::new();
        for band in &self.time_bands {
            if band.id.trim().is_empty() {
                return Err(ObolError::schema("time band id must not be empty"));
            }
            if !band_ids.insert(band.id.as_str()) {
                return Err(ObolError::schema(format!(
                    "duplicate time band id '{}'",
                    band.id
                )));
            }
            if band.days.is_empty() {
                return Err(ObolError::schema(format!(
                    "time band '{}' declares no days",
                    band.id
                )));
            }
            if band.times.is_empty() {
                return Err(ObolError::schema(format!(
                    "time band '{}' declares no clock ranges",
                    band.id
                )));
            }
            for range in &band.times {
                if range.from >= range.to {
                    return Err(ObolError::schema(format!(
                        "time band '{}' has clock range {}-{} that does not start before it ends",
                        band.id, range.from, range.to
                    )));
                }
            }
            for window in &band.date_ranges {
                if window.from > window.to {
                    return Err(ObolError::schema(format!(
                        "time band '{}' has a date range ending before it starts",
                        band.id
                    )));
                }
            }
        }

        let mut component_ids = HashSet::new();
        for component in &self.components {
            component.validate()?;
            if !component_ids.insert(component.id.as_str()) {
                return Err(ObolError::schema(format!(
                    "duplicate component id '{}'",
                    component.id
                )));
            }
        }

        Ok(())
    }
}

impl Component {
    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ObolError::schema("component id must not be empty"));
        }
        if let ComponentCategory::Extension(token) = &self.category {
            if !ComponentCategory::is_valid_extension_token(token) {
                return Err(ObolError::schema(format!(
                    "component '{}' has invalid category token '{}'",
                    self.id, token
                )));
            }
        }
        if self.unit.trim().is_empty() {
            return Err(ObolError::schema(format!(
                "component '{}' declares no rate unit",
                self.id
            )));
        }
        if self.applies_to.is_empty() {
            return Err(ObolError::schema(format!(
                "component '{}' declares no applies_to tags",
                self.id
            )));
        }
        if self.rate_schedule.is_empty() {
            return Err(ObolError::schema(format!(
                "component '{}' has an empty rate schedule",
                self.id
            )));
        }
        for tier in &self.rate_schedule {
            if let (Some(from), Some(to)) = (tier.from, tier.to) {
                if from >= to {
                    return Err(ObolError::schema(format!(
                        "component '{}' has a rate tier that does not start below its end",
                        self.id
                    )));
                }
            }
        }
        if let Some(loss_factor) = self.loss_factor {
            if !loss_factor.is_finite() || loss_factor <= 0.0 {
                return Err(ObolError::schema(format!(
                    "component '{}' has non-positive loss factor",
                    self.id
                )));
            }
        }
        if let Some(season) = &self.season {
            if season.from > season.to {
                return Err(ObolError::schema(format!(
                    "component '{}' has a season ending before it starts",
                    self.id
                )));
            }
        }
        if let Some(window) = &self.rolling_window {
            if window.months == 0 {
                return Err(ObolError::schema(format!(
                    "component '{}' has a rolling window of zero months",
                    self.id
                )));
            }
            if window.interval_minutes == 0 || window.interval_minutes > 1440 {
                return Err(ObolError::schema(format!(
                    "component '{}' has an invalid demand interval",
                    self.id
                )));
            }
        }

        let expr = crate::formula::Expr::parse(&self.calculation)?;
        for name in expr.variables() {
            if !crate::resolver::FORMULA_VARIABLES.contains(&name) {
                return Err(ObolError::formula(format!(
                    "component '{}' references unknown variable '{}'",
                    self.id, name
                )));
            }
        }

        Ok(())
    }
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

fn default_demand_interval() -> u32 {
    30
}
