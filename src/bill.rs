//! Bill result types
//!
//! A calculation produces one [`BillResult`]: the rounded total, a
//! per-component breakdown in tariff declaration order, the input
//! fingerprint, and descriptive metadata. The breakdown serializes as a
//! JSON map whose key order is the declaration order, so serialized
//! results are byte-stable across runs.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered component-id to amount mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Breakdown {
    entries: Vec<(String, Decimal)>,
}

impl Breakdown {
    /// Create an empty breakdown
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a component amount, keeping insertion order
    pub fn push<S: Into<String>>(&mut self, component_id: S, amount: Decimal) {
        self.entries.push((component_id.into(), amount));
    }

    /// Amount for a component id, if present
    pub fn amount(&self, component_id: &str) -> Option<Decimal> {
        self.entries
            .iter()
            .find(|(id, _)| id == component_id)
            .map(|(_, amount)| *amount)
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.entries.iter().map(|(id, amount)| (id.as_str(), *amount))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the breakdown holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact sum of all entry amounts
    pub fn total(&self) -> Decimal {
        self.entries.iter().map(|(_, amount)| *amount).sum()
    }
}

impl Serialize for Breakdown {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, amount) in &self.entries {
            map.serialize_entry(id, amount)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Breakdown {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct BreakdownVisitor;

        impl<'de> serde::de::Visitor<'de> for BreakdownVisitor {
            type Value = Breakdown;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of component ids to amounts")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Breakdown, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((id, amount)) = access.next_entry::<String, Decimal>()? {
                    entries.push((id, amount));
                }
                Ok(Breakdown { entries })
            }
        }

        deserializer.deserialize_map(BreakdownVisitor)
    }
}

/// Outcome of one bill calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillResult {
    /// Sum of the rounded component amounts
    pub total_cost: Decimal,

    /// Rounded amount per component, in tariff declaration order
    pub breakdown: Breakdown,

    /// Fingerprint of the calculation inputs
    pub checksum: String,

    /// Descriptors of what was billed
    pub metadata: BillMetadata,
}

/// Descriptors attached to a bill result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillMetadata {
    /// First billed date
    pub period_start: NaiveDate,

    /// Last billed date
    pub period_end: NaiveDate,

    /// Identity of the tariff document version billed against
    pub tariff_version_id: String,

    /// ISO 4217 currency code amounts are denominated in
    pub currency: String,
}
