//! Reference in-memory ledger.
//!
//! Keeps flat currency pools per account. Budget propagation between parents
//! and children is not modelled; accounts only carry what was written to them.

use super::interface::{Ledger, LedgerAccount};
use super::types::*;

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct AccountLedger {
    accounts: BTreeMap<AccountKey, Account>,
}

impl LedgerAccount for Account {
    fn status(&self) -> AccountStatus {
        self.status
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `key` and any missing ancestors. A closed account is
    /// reactivated; an active one is returned unchanged.
    pub fn create_account(
        &mut self,
        key: &AccountKey,
        account_type: AccountType,
    ) -> Result<Account, LedgerError> {
        match self.account_present_and_active(key) {
            (true, true) => {
                let existing = &self.accounts[key];
                if existing.account_type != account_type {
                    return Err(LedgerError::TypeMismatch(key.clone()));
                }
                return Ok(existing.clone());
            }
            (true, false) => return self.reactivate_account(key),
            (false, _) => {}
        }

        let ancestors = key.ancestors();
        for ancestor in &ancestors {
            if let Some(account) = self.accounts.get(ancestor)
                && account.account_type == AccountType::Spend
            {
                return Err(LedgerError::InvalidParent {
                    parent: ancestor.clone(),
                    child: key.clone(),
                });
            }
        }

        for ancestor in ancestors {
            match self.accounts.get_mut(&ancestor) {
                Some(account) if !account.is_active() => {
                    account.status = AccountStatus::Active;
                    account.touch();
                }
                Some(_) => {}
                None => {
                    tracing::debug!("Creating missing ancestor account {}", ancestor);
                    self.accounts
                        .insert(ancestor.clone(), Account::new(ancestor, AccountType::Budget));
                }
            }
        }

        let account = Account::new(key.clone(), account_type);
        self.accounts.insert(key.clone(), account.clone());
        tracing::info!("Created {:?} account {}", account_type, key);
        Ok(account)
    }

    fn active_account_mut(&mut self, key: &AccountKey) -> Result<&mut Account, LedgerError> {
        let account = self
            .accounts
            .get_mut(key)
            .ok_or_else(|| LedgerError::NotFound(key.clone()))?;
        if !account.is_active() {
            return Err(LedgerError::Closed(key.clone()));
        }
        Ok(account)
    }

    pub fn set_budget(&mut self, key: &AccountKey, budget: CurrencyPool) -> Result<Account, LedgerError> {
        let account = self.active_account_mut(key)?;
        account.budget = budget;
        account.out_of_sync = account.spent.exceeds(&account.funds());
        account.touch();
        Ok(account.clone())
    }

    pub fn set_balance(&mut self, key: &AccountKey, balance: CurrencyPool) -> Result<Account, LedgerError> {
        let account = self.active_account_mut(key)?;
        account.balance = balance;
        account.out_of_sync = account.spent.exceeds(&account.funds());
        account.touch();
        Ok(account.clone())
    }

    pub fn add_adjustment(
        &mut self,
        key: &AccountKey,
        adjustment: &CurrencyPool,
    ) -> Result<Account, LedgerError> {
        let account = self.active_account_mut(key)?;
        account.adjustments.add(adjustment);
        account.touch();
        Ok(account.clone())
    }

    /// Records the spend reported by a shadow account. Spend the account
    /// cannot cover marks it out of sync until funds are written to it.
    pub fn sync_shadow(&mut self, key: &AccountKey, spent: CurrencyPool) -> Result<Account, LedgerError> {
        let account = self.active_account_mut(key)?;
        account.out_of_sync = spent.exceeds(&account.funds());
        if account.out_of_sync {
            tracing::warn!("Shadow spend for {} exceeds its funds", key);
        }
        account.spent = spent;
        account.touch();
        Ok(account.clone())
    }

    pub fn children(&self, key: &AccountKey) -> Result<Vec<AccountKey>, LedgerError> {
        if !self.accounts.contains_key(key) {
            return Err(LedgerError::NotFound(key.clone()));
        }
        Ok(self
            .accounts
            .keys()
            .filter(|candidate| candidate.is_child_of(key))
            .cloned()
            .collect())
    }

    pub fn subtree(&self, key: &AccountKey) -> Result<BTreeMap<AccountKey, Account>, LedgerError> {
        if !self.accounts.contains_key(key) {
            return Err(LedgerError::NotFound(key.clone()));
        }
        Ok(self
            .accounts
            .range(key.clone()..)
            .take_while(|(candidate, _)| candidate.as_str().starts_with(key.as_str()))
            .filter(|(candidate, _)| key.contains(candidate))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    pub fn summary(&self, key: &AccountKey) -> Result<AccountSummary, LedgerError> {
        let mut summary = AccountSummary::default();
        for account in self.subtree(key)?.values() {
            summary.include(account);
        }
        Ok(summary)
    }

    /// One summary per root account on this shard.
    pub fn global_summary(&self) -> BTreeMap<String, AccountSummary> {
        let mut out: BTreeMap<String, AccountSummary> = BTreeMap::new();
        for (key, account) in &self.accounts {
            out.entry(key.parent_account().to_string())
                .or_default()
                .include(account);
        }
        out
    }

    pub fn keys(&self) -> Vec<AccountKey> {
        self.accounts.keys().cloned().collect()
    }

    pub fn active_keys(&self) -> Vec<AccountKey> {
        self.accounts
            .iter()
            .filter(|(_, account)| account.is_active())
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl Ledger for AccountLedger {
    type Account = Account;

    fn get_account(&self, key: &AccountKey) -> Option<&Account> {
        self.accounts.get(key)
    }

    fn for_each_account<F>(&self, mut f: F)
    where
        F: FnMut(&AccountKey, &Account),
    {
        for (key, account) in &self.accounts {
            f(key, account);
        }
    }

    fn account_present_and_active(&self, key: &AccountKey) -> (bool, bool) {
        match self.accounts.get(key) {
            Some(account) => (true, account.is_active()),
            None => (false, false),
        }
    }

    fn reactivate_account(&mut self, key: &AccountKey) -> Result<Account, LedgerError> {
        for ancestor in key.ancestors() {
            if let Some(account) = self.accounts.get_mut(&ancestor)
                && !account.is_active()
            {
                account.status = AccountStatus::Active;
                account.touch();
            }
        }
        let account = self
            .accounts
            .get_mut(key)
            .ok_or_else(|| LedgerError::NotFound(key.clone()))?;
        if !account.is_active() {
            account.status = AccountStatus::Active;
            account.touch();
            tracing::info!("Reactivated account {}", key);
        }
        Ok(account.clone())
    }

    /// Closes the account and its whole subtree.
    fn close_account(&mut self, key: &AccountKey) -> Result<Account, LedgerError> {
        if !self.accounts.contains_key(key) {
            return Err(LedgerError::NotFound(key.clone()));
        }
        for (candidate, account) in self.accounts.iter_mut() {
            if key.contains(candidate) && account.is_active() {
                account.status = AccountStatus::Closed;
                account.touch();
            }
        }
        tracing::info!("Closed account {}", key);
        Ok(self.accounts[key].clone())
    }

    fn is_account_out_of_sync(&self, key: &AccountKey) -> bool {
        self.accounts
            .get(key)
            .map(|account| account.out_of_sync)
            .unwrap_or(false)
    }

    fn to_json(&self) -> serde_json::Value {
        let map = self
            .accounts
            .iter()
            .filter_map(|(key, account)| match serde_json::to_value(account) {
                Ok(value) => Some((key.0.clone(), value)),
                Err(e) => {
                    tracing::error!("Failed to serialize account {}: {}", key, e);
                    None
                }
            })
            .collect();
        serde_json::Value::Object(map)
    }

    fn from_json(value: &serde_json::Value) -> Result<Self, LedgerError> {
        let object = value
            .as_object()
            .ok_or_else(|| LedgerError::InvalidJson("expected an object".to_string()))?;

        let mut accounts = BTreeMap::new();
        for (name, raw) in object {
            let key: AccountKey = name.parse()?;
            let account: Account = serde_json::from_value(raw.clone())
                .map_err(|e| LedgerError::InvalidJson(format!("{}: {}", name, e)))?;
            if account.name != key {
                return Err(LedgerError::InvalidJson(format!(
                    "record for {} is named {}",
                    key, account.name
                )));
            }
            accounts.insert(key, account);
        }
        Ok(Self { accounts })
    }

    fn ensure_inter_account_consistency(&mut self) -> bool {
        let missing: Vec<AccountKey> = self
            .accounts
            .keys()
            .flat_map(|key| key.ancestors())
            .filter(|ancestor| !self.accounts.contains_key(ancestor))
            .collect();

        for key in &missing {
            tracing::warn!("Recreating missing parent account {} as closed", key);
            let mut account = Account::new(key.clone(), AccountType::Budget);
            account.status = AccountStatus::Closed;
            self.accounts.insert(key.clone(), account);
        }
        missing.is_empty()
    }

    fn len(&self) -> usize {
        self.accounts.len()
    }
}
