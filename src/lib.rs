//! # Obol - Deterministic Tariff Billing Engine
//!
//! A Rust implementation of a billing engine for interval-metered energy
//! usage, turning a versioned tariff document and a set of meter samples
//! into a reproducible bill.
//!
//! ## Features
//!
//! - **Deterministic**: identical inputs always produce an identical,
//!   byte-stable bill
//! - **Time-of-Use**: band classification on the tariff's local wall
//!   clock, with weekday, clock range, and seasonal date rules
//! - **Safe Formulas**: component costs come from sandboxed arithmetic
//!   expressions, rejected at parse time outside a fixed whitelist
//! - **Exact Money**: per-component rounding to whole cents with exact
//!   decimal totals
//! - **Idempotent Storage**: results keyed by an input fingerprint, with
//!   first-writer-wins stores in memory or on disk
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! The crate is organized around the calculation pipeline:
//!
//! - `tariff`: tariff document model and validation
//! - `usage`: interval samples and billing periods
//! - `timeband`: time-of-use band classification
//! - `aggregate`: bucketing and usage aggregation
//! - `units`: rate unit normalization
//! - `formula`: safe formula parsing and evaluation
//! - `resolver`: per-component cost resolution
//! - `engine`: bill assembly and the store-backed entry point
//! - `checksum`: input fingerprinting
//! - `store`: fingerprint-keyed result stores
//! - `config`: configuration management and validation
//! - `logging`: structured logging and tracing

pub mod aggregate;
pub mod bill;
pub mod checksum;
pub mod config;
pub mod engine;
pub mod error;
pub mod formula;
pub mod logging;
pub mod resolver;
pub mod store;
pub mod tariff;
pub mod timeband;
pub mod units;
pub mod usage;

// Re-export commonly used types
pub use bill::{BillMetadata, BillResult, Breakdown};
pub use config::EngineConfig;
pub use engine::BillingEngine;
pub use error::{ObolError, Result};
pub use store::{CalcRun, FileResultStore, MemoryResultStore, ResultStore};
pub use tariff::TariffDefinition;
pub use usage::{BillingPeriod, UsageSample};
