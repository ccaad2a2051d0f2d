//! In-process key-value store.
//!
//! Mirrors the subset of Redis semantics the engine relies on. Used by the
//! tests and by `--store memory` for local development; nothing survives a
//! restart.

use super::store::KvStore;
use super::types::{KvCommand, KvError};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct MemoryState {
    strings: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
    latency: Mutex<Option<Duration>>,
    mget_calls: AtomicUsize,
    exec_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `KvError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.state.lock().strings.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        self.state
            .lock()
            .strings
            .insert(key.to_string(), value.to_string());
    }

    pub fn sadd(&self, set: &str, member: &str) {
        self.state
            .lock()
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
    }

    /// Sorted members of `set`.
    pub fn members(&self, set: &str) -> Vec<String> {
        self.state
            .lock()
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn mget_calls(&self) -> usize {
        self.mget_calls.load(Ordering::SeqCst)
    }

    pub fn exec_calls(&self) -> usize {
        self.exec_calls.load(Ordering::SeqCst)
    }

    async fn round_trip(&self) -> Result<(), KvError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn smembers(&self, set: &str) -> Result<Vec<String>, KvError> {
        self.round_trip().await?;
        Ok(self.members(set))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
        self.mget_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;
        let state = self.state.lock();
        Ok(keys.iter().map(|key| state.strings.get(key).cloned()).collect())
    }

    async fn exec(&self, commands: Vec<KvCommand>) -> Result<(), KvError> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        self.round_trip().await?;

        let mut state = self.state.lock();
        for command in commands {
            match command {
                KvCommand::Set { key, value } => {
                    state.strings.insert(key, value);
                }
                KvCommand::SAdd { set, member } => {
                    state.sets.entry(set).or_default().insert(member);
                }
                KvCommand::SMove {
                    source,
                    destination,
                    member,
                } => {
                    let moved = state
                        .sets
                        .get_mut(&source)
                        .map(|members| members.remove(&member))
                        .unwrap_or(false);
                    if moved {
                        state.sets.entry(destination).or_default().insert(member);
                    }
                }
            }
        }
        Ok(())
    }
}
