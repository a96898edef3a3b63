//! Bill calculation engine
//!
//! [`BillingEngine`] ties the pipeline together: validate the tariff,
//! aggregate usage, resolve every component in declaration order, and
//! assemble the result. Calculation is deterministic; identical inputs
//! always produce an identical bill, which is what makes the
//! fingerprint-keyed store safe to consult before doing any work.

use crate::aggregate;
use crate::bill::{BillMetadata, BillResult, Breakdown};
use crate::checksum;
use crate::config::EngineConfig;
use crate::error::{ObolError, Result};
use crate::logging::get_logger;
use crate::resolver;
use crate::store::ResultStore;
use crate::tariff::TariffDefinition;
use crate::timeband;
use crate::usage::{BillingPeriod, UsageSample};
use rust_decimal::Decimal;

/// Deterministic bill calculation engine
pub struct BillingEngine {
    settings: EngineConfig,
    logger: crate::logging::StructuredLogger,
}

impl BillingEngine {
    /// Create an engine with the given settings
    pub fn new(settings: EngineConfig) -> Self {
        Self {
            settings,
            logger: get_logger("engine"),
        }
    }

    /// Create an engine with default settings
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Settings the engine was created with
    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    /// Fingerprint the inputs of a calculation without running it
    pub fn fingerprint(
        &self,
        tariff: &TariffDefinition,
        customer_id: &str,
        period: &BillingPeriod,
        samples: &[UsageSample],
    ) -> String {
        checksum::fingerprint(&tariff.version_id(), customer_id, period, samples)
    }

    /// Calculate a bill for one customer over one billing window
    ///
    /// The tariff is validated first; nothing is computed against a
    /// document that fails validation. Components resolve in declaration
    /// order and every one of them appears in the breakdown, including
    /// out-of-season components at 0.00. The total is the exact sum of
    /// the rounded component amounts.
    pub fn calculate(
        &self,
        tariff: &TariffDefinition,
        samples: &[UsageSample],
        period: &BillingPeriod,
        customer_id: &str,
    ) -> Result<BillResult> {
        tariff.validate()?;
        if period.end < period.start {
            return Err(ObolError::schema(format!(
                "billing period ends ({}) before it starts ({})",
                period.end, period.start
            )));
        }
        let tz = timeband::resolve_timezone(&tariff.time_zone)?;

        self.logger.info(&format!(
            "Calculating bill for {} against {} over {}..{}",
            customer_id,
            tariff.version_id(),
            period.start,
            period.end
        ));

        let base = aggregate::aggregate(samples, tariff, period, &self.settings.demand)?;
        self.logger.debug(&format!(
            "Aggregated {:.3} kWh over {} days, demand {:.3} kVA",
            base.total_usage, base.days, base.max_kva
        ));

        let mut breakdown = Breakdown::new();
        let mut total_cost = Decimal::ZERO;
        for component in &tariff.components {
            let amount = resolver::resolve_component(
                component,
                &base,
                samples,
                period,
                tz,
                &self.settings.demand,
            )?;
            total_cost += amount;
            breakdown.push(component.id.clone(), amount);
        }

        let checksum = self.fingerprint(tariff, customer_id, period, samples);
        self.logger.info(&format!(
            "Calculated total {} {}",
            total_cost, self.settings.currency
        ));

        Ok(BillResult {
            total_cost,
            breakdown,
            checksum,
            metadata: BillMetadata {
                period_start: period.start,
                period_end: period.end,
                tariff_version_id: tariff.version_id(),
                currency: self.settings.currency.clone(),
            },
        })
    }

    /// Calculate a bill and store it, deduplicating on the fingerprint
    ///
    /// The store is consulted before any work runs; on a hit the stored
    /// bill comes back untouched. On a miss the bill is calculated and
    /// offered to the store, which may still hand back a concurrent
    /// winner. A failed calculation stores nothing.
    pub fn calculate_and_store(
        &self,
        store: &dyn ResultStore,
        tariff: &TariffDefinition,
        samples: &[UsageSample],
        period: &BillingPeriod,
        customer_id: &str,
    ) -> Result<BillResult> {
        let fingerprint = self.fingerprint(tariff, customer_id, period, samples);
        if let Some(existing) = store.get_by_fingerprint(&fingerprint)? {
            self.logger
                .info("Returning stored result for identical inputs");
            return Ok(existing);
        }

        let result = self.calculate(tariff, samples, period, customer_id)?;
        store.put_if_absent(&fingerprint, result)
    }
}
