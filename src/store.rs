//! Calculation result storage
//!
//! Stored results are keyed by their input fingerprint. The store
//! contract is first-writer-wins: `put_if_absent` either records the
//! offered result or hands back the one already present, so concurrent
//! calculations over identical inputs converge on a single stored bill.

use crate::bill::BillResult;
use crate::error::{ObolError, Result};
use crate::logging::get_logger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// One recorded calculation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcRun {
    /// Run identifier, assigned when the result is first stored
    pub id: Uuid,

    /// Input fingerprint the result is keyed by
    pub fingerprint: String,

    /// Instant the run was recorded
    pub completed_at: DateTime<Utc>,

    /// The stored bill
    pub result: BillResult,
}

impl CalcRun {
    fn new(fingerprint: &str, result: BillResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            fingerprint: fingerprint.to_string(),
            completed_at: Utc::now(),
            result,
        }
    }
}

/// Store of calculation results keyed by input fingerprint
pub trait ResultStore: Send + Sync {
    /// Fetch the stored result for a fingerprint, if any
    fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<BillResult>>;

    /// Store a result unless one is already present for the fingerprint
    ///
    /// Returns the result that ended up stored: the offered one when this
    /// call won, the previously stored one otherwise.
    fn put_if_absent(&self, fingerprint: &str, result: BillResult) -> Result<BillResult>;
}

/// In-memory result store
pub struct MemoryResultStore {
    runs: Mutex<HashMap<String, CalcRun>>,
    logger: crate::logging::StructuredLogger,
}

impl MemoryResultStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(HashMap::new()),
            logger: get_logger("store"),
        }
    }

    /// Number of stored runs
    pub fn len(&self) -> usize {
        self.runs.lock().map(|runs| runs.len()).unwrap_or(0)
    }

    /// Whether the store holds no runs
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the full run record for a fingerprint, if any
    pub fn run(&self, fingerprint: &str) -> Option<CalcRun> {
        self.runs
            .lock()
            .ok()
            .and_then(|runs| runs.get(fingerprint).cloned())
    }
}

impl Default for MemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore for MemoryResultStore {
    fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<BillResult>> {
        let runs = lock_runs(&self.runs)?;
        Ok(runs.get(fingerprint).map(|run| run.result.clone()))
    }

    fn put_if_absent(&self, fingerprint: &str, result: BillResult) -> Result<BillResult> {
        let mut runs = lock_runs(&self.runs)?;
        if let Some(existing) = runs.get(fingerprint) {
            self.logger.debug("Result already stored, keeping the first");
            return Ok(existing.result.clone());
        }
        runs.insert(fingerprint.to_string(), CalcRun::new(fingerprint, result.clone()));
        self.logger.debug("Stored new calculation run");
        Ok(result)
    }
}

/// File-backed result store
///
/// Runs live in memory behind a mutex and the whole set is rewritten to
/// a JSON file on every successful insert. The file holds a list of
/// [`CalcRun`] records ordered by completion time.
#[derive(Debug)]
pub struct FileResultStore {
    file_path: PathBuf,
    runs: Mutex<HashMap<String, CalcRun>>,
    logger: crate::logging::StructuredLogger,
}

impl FileResultStore {
    /// Open a store backed by the given file, loading any existing runs
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let logger = get_logger("store");
        let file_path = path.as_ref().to_path_buf();

        let mut runs = HashMap::new();
        if file_path.exists() {
            let contents = std::fs::read_to_string(&file_path)?;
            if !contents.trim().is_empty() {
                let stored: Vec<CalcRun> = serde_json::from_str(&contents)?;
                for run in stored {
                    runs.insert(run.fingerprint.clone(), run);
                }
            }
            logger.info(&format!("Loaded {} stored calculation runs", runs.len()));
        }

        Ok(Self {
            file_path,
            runs: Mutex::new(runs),
            logger,
        })
    }

    fn flush(&self, runs: &HashMap<String, CalcRun>) -> Result<()> {
        let mut ordered: Vec<&CalcRun> = runs.values().collect();
        ordered.sort_by(|a, b| {
            a.completed_at
                .cmp(&b.completed_at)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        let contents = serde_json::to_string_pretty(&ordered)?;
        std::fs::write(&self.file_path, contents)?;
        Ok(())
    }
}

impl ResultStore for FileResultStore {
    fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<BillResult>> {
        let runs = lock_runs(&self.runs)?;
        Ok(runs.get(fingerprint).map(|run| run.result.clone()))
    }

    fn put_if_absent(&self, fingerprint: &str, result: BillResult) -> Result<BillResult> {
        let mut runs = lock_runs(&self.runs)?;
        if let Some(existing) = runs.get(fingerprint) {
            self.logger.debug("Result already stored, keeping the first");
            return Ok(existing.result.clone());
        }
        runs.insert(fingerprint.to_string(), CalcRun::new(fingerprint, result.clone()));
        if let Err(err) = self.flush(&runs) {
            // Keep memory and disk agreeing when the write fails
            runs.remove(fingerprint);
            return Err(err);
        }
        self.logger.debug("Stored new calculation run");
        Ok(result)
    }
}

fn lock_runs(
    runs: &Mutex<HashMap<String, CalcRun>>,
) -> Result<std::sync::MutexGuard<'_, HashMap<String, CalcRun>>> {
    runs.lock()
        .map_err(|_| ObolError::storage("result store mutex poisoned"))
}
