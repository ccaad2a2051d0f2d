//! Persistence Engine
//!
//! Reconciles an in-memory ledger with the key-value store.
//!
//! ## Save cycle
//! 1. **Snapshot**: the ledger is cloned under a read lock; the live ledger is
//!    never touched again during the cycle.
//! 2. **Phase 1**: one `MGET` for every account key. Each snapshot record is
//!    compared with its stored counterpart and the writes it needs are queued.
//!    A record older than the stored one makes the whole cycle a data
//!    inconsistency, and nothing is written.
//! 3. **Phase 2**: the queued writes run as one `MULTI`/`EXEC` transaction.
//!
//! At most one cycle runs at a time. A trigger while a cycle is in flight is
//! logged and dropped; the next timer tick picks the changes up.

use super::store::KvStore;
use super::types::*;

use crate::ledger::interface::{Ledger, LedgerAccount};
use crate::ledger::types::{AccountKey, AccountStatus};

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

pub struct PersistenceEngine {
    store: Arc<dyn KvStore>,
    keys: StorageKeys,
    deadline: Duration,
    saving: AtomicBool,
    phase: AtomicU8,
}

/// Holds the single-flight flag for the duration of a save cycle.
struct FlightGuard<'a> {
    saving: &'a AtomicBool,
    phase: &'a AtomicU8,
}

impl<'a> FlightGuard<'a> {
    fn try_begin(saving: &'a AtomicBool, phase: &'a AtomicU8) -> Option<Self> {
        saving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self { saving, phase })
    }

    fn enter(&self, phase: SavePhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.phase.store(SavePhase::Idle as u8, Ordering::Release);
        self.saving.store(false, Ordering::Release);
    }
}

/// Writes queued by phase 1.
#[derive(Default)]
struct Reconciliation {
    commands: Vec<KvCommand>,
    bad_keys: Vec<String>,
    archived: Vec<String>,
}

impl PersistenceEngine {
    pub fn new(store: Arc<dyn KvStore>, keys: StorageKeys, deadline: Duration) -> Self {
        Self {
            store,
            keys,
            deadline,
            saving: AtomicBool::new(false),
            phase: AtomicU8::new(SavePhase::Idle as u8),
        }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    pub fn phase(&self) -> SavePhase {
        SavePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    /// Runs one save cycle against a snapshot of `ledger`.
    ///
    /// # Arguments
    /// * `ledger` - The live ledger. Only a read lock is taken, long enough to
    ///   clone it.
    ///
    /// # Returns
    /// * `None` if another cycle is already in flight.
    /// * `Some(SaveResult)` with `SUCCESS` and the archived keys,
    ///   `DATA_INCONSISTENCY` and the stale or unreadable keys, or
    ///   `PERSISTENCE_ERROR` and the backend error.
    pub async fn save<L: Ledger>(&self, ledger: &RwLock<L>) -> Option<SaveResult> {
        let Some(flight) = FlightGuard::try_begin(&self.saving, &self.phase) else {
            tracing::warn!("Save requested while a save is in progress, skipping");
            return None;
        };

        let started = Instant::now();
        let snapshot = ledger.read().clone();

        let mut result = match tokio::time::timeout(self.deadline, self.save_snapshot(&flight, &snapshot)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("Save did not finish within {:?}", self.deadline);
                SaveResult::persistence_error("timeout")
            }
        };
        result.record(LATENCY_TOTAL, started.elapsed());
        log_outcome("Save", &result);

        Some(result)
    }

    async fn save_snapshot<L: Ledger>(&self, flight: &FlightGuard<'_>, snapshot: &L) -> SaveResult {
        flight.enter(SavePhase::InPhase1);
        let phase1_started = Instant::now();

        let mut entries: Vec<(AccountKey, L::Account)> = Vec::with_capacity(snapshot.len());
        snapshot.for_each_account(|key, account| {
            if snapshot.is_account_out_of_sync(key) {
                tracing::debug!("Account {} is out of sync, not saving it this cycle", key);
            } else {
                entries.push((key.clone(), account.clone()));
            }
        });

        if entries.is_empty() {
            return SaveResult::success();
        }

        let value_keys: Vec<String> = entries
            .iter()
            .map(|(key, _)| self.keys.value_key(key.as_str()))
            .collect();

        let stored = match self.store.mget(&value_keys).await {
            Ok(stored) => stored,
            Err(e) => {
                let mut result = SaveResult::persistence_error(e);
                result.record(LATENCY_PHASE1, phase1_started.elapsed());
                return result;
            }
        };

        let in_phase1_started = Instant::now();
        let plan = self.reconcile(&entries, &value_keys, stored);
        let in_phase1 = in_phase1_started.elapsed();
        let phase1 = phase1_started.elapsed();

        if !plan.bad_keys.is_empty() {
            let mut result = SaveResult::data_inconsistency(&plan.bad_keys);
            result.record(LATENCY_PHASE1, phase1);
            result.record(LATENCY_IN_PHASE1, in_phase1);
            return result;
        }

        if plan.commands.is_empty() {
            let mut result = SaveResult::success();
            result.record(LATENCY_PHASE1, phase1);
            result.record(LATENCY_IN_PHASE1, in_phase1);
            return result;
        }

        flight.enter(SavePhase::InPhase2);
        let phase2_started = Instant::now();
        tracing::debug!("Committing {} writes", plan.commands.len());

        let mut result = match self.store.exec(plan.commands).await {
            Ok(()) => SaveResult::archived(&plan.archived),
            Err(e) => SaveResult::persistence_error(e),
        };
        result.record(LATENCY_PHASE1, phase1);
        result.record(LATENCY_IN_PHASE1, in_phase1);
        result.record(LATENCY_PHASE2, phase2_started.elapsed());
        result
    }

    /// Compares every snapshot record with its stored value and queues the
    /// writes that bring the store up to date.
    fn reconcile<A: LedgerAccount>(
        &self,
        entries: &[(AccountKey, A)],
        value_keys: &[String],
        stored: Vec<Option<String>>,
    ) -> Reconciliation {
        let mut plan = Reconciliation::default();

        for (((key, account), value_key), stored) in entries.iter().zip(value_keys).zip(stored) {
            let current = match serde_json::to_value(account) {
                Ok(value) => value,
                Err(e) => {
                    tracing::error!("Cannot serialize account {}: {}", key, e);
                    continue;
                }
            };

            let Some(raw) = stored else {
                plan.commands.push(KvCommand::SAdd {
                    set: self.keys.active_set.clone(),
                    member: key.0.clone(),
                });
                plan.commands.push(KvCommand::Set {
                    key: value_key.clone(),
                    value: current.to_string(),
                });
                continue;
            };

            let (previous_value, previous) = match parse_stored::<A>(&raw) {
                Some(parsed) => parsed,
                None => {
                    tracing::error!("Stored value for {} is unreadable", key);
                    plan.bad_keys.push(key.0.clone());
                    continue;
                }
            };

            if !account.is_same_or_past_version(&previous) {
                tracing::error!(
                    "Account {} is at version {} but version {} is stored",
                    key,
                    account.version(),
                    previous.version()
                );
                plan.bad_keys.push(key.0.clone());
                continue;
            }

            if current != previous_value {
                plan.commands.push(KvCommand::Set {
                    key: value_key.clone(),
                    value: current.to_string(),
                });
            }

            match (account.status(), previous.status()) {
                (AccountStatus::Closed, AccountStatus::Active) => {
                    plan.commands.push(KvCommand::SMove {
                        source: self.keys.active_set.clone(),
                        destination: self.keys.archive_set.clone(),
                        member: key.0.clone(),
                    });
                    plan.archived.push(key.0.clone());
                }
                (AccountStatus::Active, AccountStatus::Closed) => {
                    plan.commands.push(KvCommand::SMove {
                        source: self.keys.archive_set.clone(),
                        destination: self.keys.active_set.clone(),
                        member: key.0.clone(),
                    });
                }
                _ => {}
            }
        }

        plan
    }

    /// Replaces the contents of `ledger` with every indexed account, open ones
    /// from the active set and closed ones from the archive. The ledger is
    /// only swapped when the stored data loads cleanly.
    pub async fn load<L: Ledger>(&self, ledger: &RwLock<L>) -> SaveResult {
        let started = Instant::now();

        let mut result = match tokio::time::timeout(self.deadline, self.read_ledger::<L>()).await {
            Ok(Ok(loaded)) => {
                let accounts = loaded.len();
                *ledger.write() = loaded;
                tracing::info!("Loaded {} accounts", accounts);
                SaveResult::success()
            }
            Ok(Err(result)) => result,
            Err(_) => {
                tracing::error!("Load did not finish within {:?}", self.deadline);
                SaveResult::persistence_error("timeout")
            }
        };
        result.record(LATENCY_TOTAL, started.elapsed());
        log_outcome("Load", &result);

        result
    }

    async fn read_ledger<L: Ledger>(&self) -> Result<L, SaveResult> {
        let active = self
            .store
            .smembers(&self.keys.active_set)
            .await
            .map_err(SaveResult::persistence_error)?;
        let archived = self
            .store
            .smembers(&self.keys.archive_set)
            .await
            .map_err(SaveResult::persistence_error)?;

        let members: Vec<String> = active
            .into_iter()
            .chain(archived)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if members.is_empty() {
            return Ok(L::default());
        }

        let value_keys: Vec<String> = members.iter().map(|m| self.keys.value_key(m)).collect();
        let values = self
            .store
            .mget(&value_keys)
            .await
            .map_err(SaveResult::persistence_error)?;

        let mut missing = Vec::new();
        let mut unreadable = Vec::new();
        let mut object = serde_json::Map::with_capacity(members.len());
        for (member, value) in members.iter().zip(values) {
            match value {
                None => missing.push(member.clone()),
                Some(raw) => match serde_json::from_str::<Value>(&raw) {
                    Ok(parsed) => {
                        object.insert(member.clone(), parsed);
                    }
                    Err(e) => {
                        tracing::error!("Stored value for {} is unreadable: {}", member, e);
                        unreadable.push(member.clone());
                    }
                },
            }
        }

        if !missing.is_empty() {
            tracing::error!("Indexed accounts without a stored value: {:?}", missing);
            return Err(SaveResult::data_inconsistency(&missing));
        }
        if !unreadable.is_empty() {
            return Err(SaveResult::data_inconsistency(&unreadable));
        }

        let mut loaded = L::from_json(&Value::Object(object)).map_err(|e| {
            tracing::error!("Stored accounts do not form a ledger: {}", e);
            SaveResult::data_inconsistency(&members)
        })?;

        if !loaded.ensure_inter_account_consistency() {
            tracing::warn!("Loaded ledger needed structural repairs");
        }
        Ok(loaded)
    }
}

fn parse_stored<A: LedgerAccount>(raw: &str) -> Option<(Value, A)> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let account = serde_json::from_value(value.clone()).ok()?;
    Some((value, account))
}

fn log_outcome(operation: &str, result: &SaveResult) {
    let total = result.latencies.get(LATENCY_TOTAL).copied().unwrap_or_default();
    match result.status {
        SaveStatus::Success if result.keys().is_empty() => {
            tracing::debug!("{} succeeded in {:.1}ms", operation, total)
        }
        SaveStatus::Success => {
            tracing::info!("{} succeeded in {:.1}ms, archived {}", operation, total, result.info)
        }
        SaveStatus::PersistenceError => {
            tracing::error!("{} failed: persistence error: {}", operation, result.info)
        }
        SaveStatus::DataInconsistency => {
            tracing::error!("{} failed: inconsistent keys {}", operation, result.info)
        }
    }
}
