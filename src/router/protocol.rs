//! Ledger API paths and the pure path classifier shared by the shard-side
//! router and the relay.

use super::types::ResolvedPath;

/// Default prefix in front of every ledger endpoint.
pub const DEFAULT_API_PREFIX: &str = "/v1";

pub const ENDPOINT_ACCOUNTS: &str = "/accounts";
pub const ENDPOINT_ACTIVE_ACCOUNTS: &str = "/activeaccounts";
pub const ENDPOINT_SUMMARY: &str = "/summary";

/// Account placeholder for routes that address the whole collection.
pub const ALL_ACCOUNTS: &str = "*";

pub const ACTION_COLLECTION: &str = "";
pub const ACTION_ADJUSTMENT: &str = "adjustment";
pub const ACTION_BALANCE: &str = "balance";
pub const ACTION_SHADOW: &str = "shadow";
pub const ACTION_BUDGET: &str = "budget";
pub const ACTION_CHILDREN: &str = "children";
pub const ACTION_CLOSE: &str = "close";
pub const ACTION_SUBTREE: &str = "subtree";
pub const ACTION_SUMMARY: &str = "summary";
pub const ACTION_ACTIVE_ACCOUNTS: &str = "activeaccounts";

/// Mutating actions, reachable with POST or PUT.
pub const WRITE_ACTIONS: [&str; 4] = [ACTION_ADJUSTMENT, ACTION_BALANCE, ACTION_SHADOW, ACTION_BUDGET];
/// Read actions on a single account, reachable with GET.
pub const READ_ACTIONS: [&str; 4] = [ACTION_CHILDREN, ACTION_CLOSE, ACTION_SUBTREE, ACTION_SUMMARY];

pub const QUERY_ACCOUNT_NAME: &str = "accountName";
pub const QUERY_ACCOUNT_TYPE: &str = "accountType";

/// Absolute paths of the ledger API under one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePaths {
    pub accounts: String,
    pub active_accounts: String,
    pub summary: String,
}

impl RoutePaths {
    pub fn new(api_prefix: &str) -> Self {
        let prefix = api_prefix.trim_end_matches('/');
        Self {
            accounts: format!("{}{}", prefix, ENDPOINT_ACCOUNTS),
            active_accounts: format!("{}{}", prefix, ENDPOINT_ACTIVE_ACCOUNTS),
            summary: format!("{}{}", prefix, ENDPOINT_SUMMARY),
        }
    }

    /// Splits a request path into account and action.
    ///
    /// `/accounts` -> (`*`, ``), `/accounts/<name>` -> (name, ``),
    /// `/accounts/<name>/<action>` -> (name, action). The two global paths map
    /// to their own action with account `*`. Anything else is unroutable.
    pub fn resolve(&self, path: &str) -> Option<ResolvedPath> {
        let Some(rest) = path.strip_prefix(self.accounts.as_str()) else {
            return self.resolve_special(path);
        };
        if !rest.is_empty() && !rest.starts_with('/') {
            return self.resolve_special(path);
        }
        if rest.is_empty() {
            return Some(ResolvedPath {
                account: ALL_ACCOUNTS.to_string(),
                action: ACTION_COLLECTION.to_string(),
            });
        }

        let parts: Vec<&str> = rest.split('/').collect();
        match parts.as_slice() {
            [_, account, action] => Some(ResolvedPath {
                account: account.to_string(),
                action: action.to_string(),
            }),
            [_, account] => Some(ResolvedPath {
                account: account.to_string(),
                action: ACTION_COLLECTION.to_string(),
            }),
            _ => None,
        }
    }

    fn resolve_special(&self, path: &str) -> Option<ResolvedPath> {
        let action = if path == self.active_accounts {
            ACTION_ACTIVE_ACCOUNTS
        } else if path == self.summary {
            ACTION_SUMMARY
        } else {
            return None;
        };
        Some(ResolvedPath {
            account: ALL_ACCOUNTS.to_string(),
            action: action.to_string(),
        })
    }

    /// True for the three global listing paths.
    pub fn is_global(&self, path: &str) -> bool {
        path == self.accounts || path == self.active_accounts || path == self.summary
    }
}

impl Default for RoutePaths {
    fn default() -> Self {
        Self::new(DEFAULT_API_PREFIX)
    }
}
