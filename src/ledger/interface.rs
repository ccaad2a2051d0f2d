//! The seam between the core (relay, router, persistence) and whatever
//! implements account arithmetic. The persistence engine only ever talks to a
//! ledger through these traits.

use super::types::{AccountKey, AccountStatus, LedgerError};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// What the persistence engine needs to know about a single account record.
pub trait LedgerAccount: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn status(&self) -> AccountStatus;

    fn version(&self) -> u64;

    /// True when `self` is the same version as `other` or newer.
    fn is_same_or_past_version(&self, other: &Self) -> bool {
        self.version() >= other.version()
    }
}

pub trait Ledger: Default + Clone + Send + Sync + 'static {
    type Account: LedgerAccount;

    fn get_account(&self, key: &AccountKey) -> Option<&Self::Account>;

    fn for_each_account<F>(&self, f: F)
    where
        F: FnMut(&AccountKey, &Self::Account);

    /// `(present, active)`.
    fn account_present_and_active(&self, key: &AccountKey) -> (bool, bool);

    fn reactivate_account(&mut self, key: &AccountKey) -> Result<Self::Account, LedgerError>;

    fn close_account(&mut self, key: &AccountKey) -> Result<Self::Account, LedgerError>;

    fn is_account_out_of_sync(&self, key: &AccountKey) -> bool;

    /// A JSON object mapping account keys to account records.
    fn to_json(&self) -> serde_json::Value;

    fn from_json(value: &serde_json::Value) -> Result<Self, LedgerError>;

    /// Repairs parent/child structure after a bulk load. Returns false if
    /// anything had to be repaired.
    fn ensure_inter_account_consistency(&mut self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
