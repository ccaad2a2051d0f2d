//! Route table of a ledger shard.
//!
//! Every handler runs synchronously under the ledger lock and returns the
//! JSON body of its reply.

use crate::ledger::accounts::AccountLedger;
use crate::ledger::interface::Ledger;
use crate::ledger::types::*;
use crate::router::protocol::*;
use crate::router::registry::Router;
use crate::router::types::{HandlerError, Method, RouteRequest};

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

type LedgerOp = fn(&RwLock<AccountLedger>, &RouteRequest) -> Result<String, HandlerError>;

pub fn register_routes(router: &Router, ledger: &Arc<RwLock<AccountLedger>>) {
    bind(router, Method::Post, ACTION_COLLECTION, ledger, create_account);
    bind(router, Method::Get, ACTION_COLLECTION, ledger, get_accounts);
    bind(router, Method::Get, ACTION_ACTIVE_ACCOUNTS, ledger, active_accounts);
    bind(router, Method::Get, ACTION_SUMMARY, ledger, summary);
    bind(router, Method::Get, ACTION_CHILDREN, ledger, children);
    bind(router, Method::Get, ACTION_SUBTREE, ledger, subtree);
    bind(router, Method::Get, ACTION_CLOSE, ledger, close_account);

    for method in [Method::Post, Method::Put] {
        bind(router, method, ACTION_BUDGET, ledger, set_budget);
        bind(router, method, ACTION_BALANCE, ledger, set_balance);
        bind(router, method, ACTION_SHADOW, ledger, sync_shadow);
        bind(router, method, ACTION_ADJUSTMENT, ledger, add_adjustment);
    }

    tracing::info!("Registered {} ledger routes", router.route_count());
}

fn bind(router: &Router, method: Method, action: &str, ledger: &Arc<RwLock<AccountLedger>>, op: LedgerOp) {
    let ledger = ledger.clone();
    router.register(method, action, move |req: &RouteRequest| op(&ledger, req));
}

fn ledger_error(e: LedgerError) -> HandlerError {
    match e {
        LedgerError::NotFound(key) => HandlerError::NotFound(key.0),
        LedgerError::InvalidJson(message) => HandlerError::Internal(message),
        other => HandlerError::Validation(other.to_string()),
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<String, HandlerError> {
    serde_json::to_string(value).map_err(|e| HandlerError::Internal(e.to_string()))
}

fn account_key(req: &RouteRequest) -> Result<AccountKey, HandlerError> {
    req.account.parse().map_err(ledger_error)
}

fn query_param<'a>(req: &'a RouteRequest, name: &str) -> Result<&'a str, HandlerError> {
    req.query
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| HandlerError::Validation(format!("missing query parameter {}", name)))
}

fn currency_pool(req: &RouteRequest) -> Result<CurrencyPool, HandlerError> {
    serde_json::from_str(&req.body)
        .map_err(|e| HandlerError::Validation(format!("invalid currency pool: {}", e)))
}

/// `POST /accounts?accountName=..&accountType=budget|spend`
fn create_account(ledger: &RwLock<AccountLedger>, req: &RouteRequest) -> Result<String, HandlerError> {
    if req.account != ALL_ACCOUNTS {
        return Err(HandlerError::NotFound(req.path.clone()));
    }
    let key: AccountKey = query_param(req, QUERY_ACCOUNT_NAME)?
        .parse()
        .map_err(ledger_error)?;
    let account_type: AccountType = query_param(req, QUERY_ACCOUNT_TYPE)?
        .parse()
        .map_err(ledger_error)?;

    let account = ledger
        .write()
        .create_account(&key, account_type)
        .map_err(ledger_error)?;
    to_body(&account)
}

/// `GET /accounts` lists every key, `GET /accounts/<name>` returns the record.
fn get_accounts(ledger: &RwLock<AccountLedger>, req: &RouteRequest) -> Result<String, HandlerError> {
    if req.account == ALL_ACCOUNTS {
        return to_body(&ledger.read().keys());
    }
    let key = account_key(req)?;
    let ledger = ledger.read();
    let account = ledger
        .get_account(&key)
        .ok_or_else(|| HandlerError::NotFound(key.0.clone()))?;
    to_body(account)
}

fn active_accounts(ledger: &RwLock<AccountLedger>, _req: &RouteRequest) -> Result<String, HandlerError> {
    to_body(&ledger.read().active_keys())
}

/// `GET /summary` is keyed by parent account; `GET /accounts/<name>/summary`
/// covers one subtree.
fn summary(ledger: &RwLock<AccountLedger>, req: &RouteRequest) -> Result<String, HandlerError> {
    if req.account == ALL_ACCOUNTS {
        return to_body(&ledger.read().global_summary());
    }
    let key = account_key(req)?;
    let summary = ledger.read().summary(&key).map_err(ledger_error)?;
    to_body(&summary)
}

fn children(ledger: &RwLock<AccountLedger>, req: &RouteRequest) -> Result<String, HandlerError> {
    let key = account_key(req)?;
    let children = ledger.read().children(&key).map_err(ledger_error)?;
    to_body(&children)
}

fn subtree(ledger: &RwLock<AccountLedger>, req: &RouteRequest) -> Result<String, HandlerError> {
    let key = account_key(req)?;
    let subtree = ledger.read().subtree(&key).map_err(ledger_error)?;
    to_body(&subtree)
}

fn close_account(ledger: &RwLock<AccountLedger>, req: &RouteRequest) -> Result<String, HandlerError> {
    let key = account_key(req)?;
    let account = ledger.write().close_account(&key).map_err(ledger_error)?;
    to_body(&account)
}

fn set_budget(ledger: &RwLock<AccountLedger>, req: &RouteRequest) -> Result<String, HandlerError> {
    let key = account_key(req)?;
    let budget = currency_pool(req)?;
    let account = ledger.write().set_budget(&key, budget).map_err(ledger_error)?;
    to_body(&account)
}

fn set_balance(ledger: &RwLock<AccountLedger>, req: &RouteRequest) -> Result<String, HandlerError> {
    let key = account_key(req)?;
    let balance = currency_pool(req)?;
    let account = ledger.write().set_balance(&key, balance).map_err(ledger_error)?;
    to_body(&account)
}

fn sync_shadow(ledger: &RwLock<AccountLedger>, req: &RouteRequest) -> Result<String, HandlerError> {
    let key = account_key(req)?;
    let spent = currency_pool(req)?;
    let account = ledger.write().sync_shadow(&key, spent).map_err(ledger_error)?;
    to_body(&account)
}

fn add_adjustment(ledger: &RwLock<AccountLedger>, req: &RouteRequest) -> Result<String, HandlerError> {
    let key = account_key(req)?;
    let adjustment = currency_pool(req)?;
    let account = ledger
        .write()
        .add_adjustment(&key, &adjustment)
        .map_err(ledger_error)?;
    to_body(&account)
}
