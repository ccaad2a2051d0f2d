use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Separator between the segments of a hierarchical account path.
pub const ACCOUNT_SEPARATOR: char = ':';

/// Hierarchical account path such as `east:campaign1`.
///
/// Identity and ordering are the exact string. The first segment is the
/// parent account, which is the unit of shard ownership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct AccountKey(pub String);

impl AccountKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First colon-delimited segment.
    pub fn parent_account(&self) -> &str {
        parent_account_of(&self.0)
    }

    /// The key one level up, `None` for a root account.
    pub fn parent(&self) -> Option<AccountKey> {
        self.0
            .rsplit_once(ACCOUNT_SEPARATOR)
            .map(|(parent, _)| AccountKey(parent.to_string()))
    }

    /// Every proper ancestor, root first.
    pub fn ancestors(&self) -> Vec<AccountKey> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(key) = current {
            current = key.parent();
            out.push(key);
        }
        out.reverse();
        out
    }

    /// True for `self` itself and every key below it.
    pub fn contains(&self, other: &AccountKey) -> bool {
        other.0 == self.0
            || (other.0.starts_with(&self.0)
                && other.0[self.0.len()..].starts_with(ACCOUNT_SEPARATOR))
    }

    pub fn is_child_of(&self, other: &AccountKey) -> bool {
        self.parent().as_ref() == Some(other)
    }
}

impl FromStr for AccountKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty()
            || s.contains('/')
            || s.split(ACCOUNT_SEPARATOR).any(|segment| segment.is_empty())
        {
            return Err(LedgerError::InvalidAccountKey(s.to_string()));
        }
        Ok(AccountKey(s.to_string()))
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parent account of a raw, possibly unvalidated, account name.
pub fn parent_account_of(name: &str) -> &str {
    name.split(ACCOUNT_SEPARATOR).next().unwrap_or(name)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Distributes budget to its children.
    Budget,
    /// Leaf account that records spend reported by bidders.
    Spend,
}

impl FromStr for AccountType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "budget" => Ok(AccountType::Budget),
            "spend" => Ok(AccountType::Spend),
            other => Err(LedgerError::UnknownAccountType(other.to_string())),
        }
    }
}

/// Amounts keyed by currency code, e.g. `{"USD/1M": 1500}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CurrencyPool(pub BTreeMap<String, i64>);

impl CurrencyPool {
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|amount| *amount == 0)
    }

    pub fn add(&mut self, other: &CurrencyPool) {
        for (currency, amount) in &other.0 {
            *self.0.entry(currency.clone()).or_insert(0) += amount;
        }
    }

    pub fn plus(&self, other: &CurrencyPool) -> CurrencyPool {
        let mut out = self.clone();
        out.add(other);
        out
    }

    pub fn minus(&self, other: &CurrencyPool) -> CurrencyPool {
        let mut out = self.clone();
        for (currency, amount) in &other.0 {
            *out.0.entry(currency.clone()).or_insert(0) -= amount;
        }
        out
    }

    /// True when any currency in `self` is above the same currency in `limit`.
    pub fn exceeds(&self, limit: &CurrencyPool) -> bool {
        self.0
            .iter()
            .any(|(currency, amount)| *amount > limit.0.get(currency).copied().unwrap_or(0))
    }
}

/// A single node of the account tree as stored and served.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub name: AccountKey,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub status: AccountStatus,
    pub version: u64,
    #[serde(default)]
    pub budget: CurrencyPool,
    #[serde(default)]
    pub balance: CurrencyPool,
    #[serde(default)]
    pub spent: CurrencyPool,
    #[serde(default)]
    pub adjustments: CurrencyPool,
    /// Runtime only: the last shadow sync reported more spend than the
    /// account can cover.
    #[serde(skip)]
    pub out_of_sync: bool,
}

impl Account {
    pub fn new(name: AccountKey, account_type: AccountType) -> Self {
        Self {
            name,
            account_type,
            status: AccountStatus::Active,
            version: 1,
            budget: CurrencyPool::default(),
            balance: CurrencyPool::default(),
            spent: CurrencyPool::default(),
            adjustments: CurrencyPool::default(),
            out_of_sync: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Everything written to the account, before spend.
    pub fn funds(&self) -> CurrencyPool {
        self.budget.plus(&self.balance).plus(&self.adjustments)
    }

    /// Funds the account may still spend.
    pub fn available(&self) -> CurrencyPool {
        self.funds().minus(&self.spent)
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
    }
}

/// Aggregate of an account and everything below it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub accounts: usize,
    pub budget: CurrencyPool,
    pub balance: CurrencyPool,
    pub spent: CurrencyPool,
    pub adjustments: CurrencyPool,
    pub available: CurrencyPool,
}

impl AccountSummary {
    pub fn include(&mut self, account: &Account) {
        self.accounts += 1;
        self.budget.add(&account.budget);
        self.balance.add(&account.balance);
        self.spent.add(&account.spent);
        self.adjustments.add(&account.adjustments);
        self.available.add(&account.available());
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("account not found: {0}")]
    NotFound(AccountKey),

    #[error("account is closed: {0}")]
    Closed(AccountKey),

    #[error("invalid account name: {0:?}")]
    InvalidAccountKey(String),

    #[error("unknown account type: {0}")]
    UnknownAccountType(String),

    #[error("account {child} cannot be created under spend account {parent}")]
    InvalidParent { parent: AccountKey, child: AccountKey },

    #[error("account {0} already exists with a different type")]
    TypeMismatch(AccountKey),

    #[error("invalid ledger json: {0}")]
    InvalidJson(String),
}
