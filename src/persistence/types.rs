use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub const LATENCY_PHASE1: &str = "phase1TimeElapsedMs";
pub const LATENCY_PHASE2: &str = "phase2TimeElapsedMs";
pub const LATENCY_IN_PHASE1: &str = "inPhase1TimeElapsedMs";
pub const LATENCY_TOTAL: &str = "totalTimeElapsedMs";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaveStatus {
    Success,
    /// The backend could not be reached or rejected the transaction.
    PersistenceError,
    /// Stored data and the ledger disagree in a way that needs an operator.
    DataInconsistency,
}

/// Outcome of a save or load cycle.
///
/// `info` depends on `status`:
/// - `Success`: empty, or the JSON list of keys moved to the archive.
/// - `PersistenceError`: the backend error text.
/// - `DataInconsistency`: the JSON list of offending keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveResult {
    pub status: SaveStatus,
    pub info: String,
    /// Named latencies in milliseconds. Observational only.
    pub latencies: BTreeMap<String, f64>,
}

impl SaveResult {
    pub fn success() -> Self {
        Self::new(SaveStatus::Success, String::new())
    }

    pub fn archived(keys: &[String]) -> Self {
        Self::new(SaveStatus::Success, keys_to_json(keys))
    }

    pub fn persistence_error(error: impl ToString) -> Self {
        Self::new(SaveStatus::PersistenceError, error.to_string())
    }

    pub fn data_inconsistency(keys: &[String]) -> Self {
        Self::new(SaveStatus::DataInconsistency, keys_to_json(keys))
    }

    fn new(status: SaveStatus, info: String) -> Self {
        Self {
            status,
            info,
            latencies: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SaveStatus::Success
    }

    pub fn record(&mut self, name: &str, elapsed: Duration) {
        self.latencies
            .insert(name.to_string(), elapsed.as_secs_f64() * 1000.0);
    }

    /// Keys listed in `info`, for the statuses that carry a key list.
    pub fn keys(&self) -> Vec<String> {
        match self.status {
            SaveStatus::PersistenceError => Vec::new(),
            SaveStatus::Success | SaveStatus::DataInconsistency => {
                serde_json::from_str(&self.info).unwrap_or_default()
            }
        }
    }
}

fn keys_to_json(keys: &[String]) -> String {
    serde_json::to_string(keys).unwrap_or_else(|_| "[]".to_string())
}

/// Where a save cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SavePhase {
    Idle = 0,
    InPhase1 = 1,
    InPhase2 = 2,
}

impl SavePhase {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => SavePhase::InPhase1,
            2 => SavePhase::InPhase2,
            _ => SavePhase::Idle,
        }
    }
}

/// One write inside the phase-2 transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCommand {
    Set { key: String, value: String },
    SAdd { set: String, member: String },
    SMove { source: String, destination: String, member: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum KvError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("backend unavailable")]
    Unavailable,
}

/// Key layout in the store. Compatible with the offline resharding tooling:
/// values at `<prefix>-<account>`, active accounts in `<prefix>:accounts`,
/// archived accounts in `<prefix>:archive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    prefix: String,
    pub active_set: String,
    pub archive_set: String,
}

impl StorageKeys {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            active_set: format!("{}:accounts", prefix),
            archive_set: format!("{}:archive", prefix),
        }
    }

    pub fn value_key(&self, account: &str) -> String {
        format!("{}-{}", self.prefix, account)
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_KEY_PREFIX)
    }
}
