//! Persistence Module Tests
//!
//! Exercises the save and load cycles against the in-process store.
//!
//! ## Test Scopes
//! - **Save**: first write, idempotence, version guard, archive migration,
//!   out-of-sync skipping, single-flight, backend failures, deadlines.
//! - **Load**: round trip, missing and unreadable values, structural repair.

#[cfg(test)]
mod tests {
    use crate::ledger::accounts::AccountLedger;
    use crate::ledger::interface::Ledger;
    use crate::ledger::types::*;
    use crate::persistence::engine::PersistenceEngine;
    use crate::persistence::memory::MemoryStore;
    use crate::persistence::types::*;
    use parking_lot::RwLock;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    const ACTIVE: &str = "banker:accounts";
    const ARCHIVE: &str = "banker:archive";

    fn key(name: &str) -> AccountKey {
        name.parse().unwrap()
    }

    fn usd(amount: i64) -> CurrencyPool {
        CurrencyPool(BTreeMap::from([("USD/1M".to_string(), amount)]))
    }

    fn setup() -> (Arc<MemoryStore>, PersistenceEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = PersistenceEngine::new(store.clone(), StorageKeys::default(), Duration::from_secs(5));
        (store, engine)
    }

    fn ledger_with(names: &[&str]) -> RwLock<AccountLedger> {
        let mut ledger = AccountLedger::new();
        for name in names {
            ledger.create_account(&key(name), AccountType::Budget).unwrap();
        }
        RwLock::new(ledger)
    }

    fn stored_account(store: &MemoryStore, name: &str) -> Option<Account> {
        store
            .get(&format!("banker-{}", name))
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    // ============================================================
    // SAVE: first write and idempotence
    // ============================================================

    #[tokio::test]
    async fn test_save_writes_new_accounts_to_active_set() {
        // ARRANGE
        let (store, engine) = setup();
        let ledger = ledger_with(&["east:c1"]);

        // ACT
        let result = engine.save(&ledger).await.unwrap();

        // ASSERT
        assert_eq!(result.status, SaveStatus::Success);
        assert!(result.keys().is_empty(), "Nothing was archived");
        assert_eq!(store.members(ACTIVE), vec!["east", "east:c1"]);
        assert_eq!(store.exec_calls(), 1);

        let stored = stored_account(&store, "east:c1").unwrap();
        assert_eq!(stored.name, key("east:c1"));
        assert_eq!(stored.status, AccountStatus::Active);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_save_twice_without_changes_skips_phase2() {
        // ARRANGE
        let (store, engine) = setup();
        let ledger = ledger_with(&["east:c1", "west"]);
        engine.save(&ledger).await.unwrap();

        // ACT
        let second = engine.save(&ledger).await.unwrap();

        // ASSERT
        assert_eq!(second.status, SaveStatus::Success);
        assert_eq!(second.info, "");
        assert_eq!(store.exec_calls(), 1, "No transaction for an unchanged ledger");
        assert_eq!(store.mget_calls(), 2);
        assert!(second.latencies.contains_key(LATENCY_PHASE1));
        assert!(second.latencies.contains_key(LATENCY_TOTAL));
        assert!(!second.latencies.contains_key(LATENCY_PHASE2));
    }

    #[tokio::test]
    async fn test_save_rewrites_changed_account() {
        // ARRANGE
        let (store, engine) = setup();
        let ledger = ledger_with(&["east:c1"]);
        engine.save(&ledger).await.unwrap();

        // ACT
        ledger.write().set_budget(&key("east:c1"), usd(500)).unwrap();
        let result = engine.save(&ledger).await.unwrap();

        // ASSERT
        assert!(result.is_success());
        let stored = stored_account(&store, "east:c1").unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.budget, usd(500));
        assert!(result.latencies.contains_key(LATENCY_PHASE2));
    }

    // ============================================================
    // SAVE: version guard
    // ============================================================

    #[tokio::test]
    async fn test_save_with_stale_account_writes_nothing() {
        // ARRANGE: Another process stored a newer version of "east"
        let (store, engine) = setup();
        let ledger = ledger_with(&["east:c1"]);
        engine.save(&ledger).await.unwrap();

        let mut newer = Account::new(key("east"), AccountType::Budget);
        newer.version = 99;
        store.set("banker-east", &serde_json::to_string(&newer).unwrap());

        // ACT: A legitimate local change is pending as well
        ledger.write().set_budget(&key("east:c1"), usd(10)).unwrap();
        let result = engine.save(&ledger).await.unwrap();

        // ASSERT
        assert_eq!(result.status, SaveStatus::DataInconsistency);
        assert_eq!(result.keys(), vec!["east".to_string()]);
        assert_eq!(store.exec_calls(), 1, "The whole cycle is aborted");
        assert_eq!(stored_account(&store, "east:c1").unwrap().version, 1);
        assert_eq!(stored_account(&store, "east").unwrap().version, 99);
    }

    #[tokio::test]
    async fn test_save_reports_every_stale_key() {
        // ARRANGE
        let (store, engine) = setup();
        let ledger = ledger_with(&["east", "west"]);
        for name in ["east", "west"] {
            let mut newer = Account::new(key(name), AccountType::Budget);
            newer.version = 5;
            store.set(&format!("banker-{}", name), &serde_json::to_string(&newer).unwrap());
        }

        // ACT
        let result = engine.save(&ledger).await.unwrap();

        // ASSERT
        assert_eq!(result.status, SaveStatus::DataInconsistency);
        assert_eq!(result.keys(), vec!["east".to_string(), "west".to_string()]);
    }

    #[tokio::test]
    async fn test_save_treats_unreadable_stored_value_as_inconsistent() {
        // ARRANGE
        let (store, engine) = setup();
        let ledger = ledger_with(&["east"]);
        store.set("banker-east", "{not json");

        // ACT
        let result = engine.save(&ledger).await.unwrap();

        // ASSERT
        assert_eq!(result.status, SaveStatus::DataInconsistency);
        assert_eq!(result.keys(), vec!["east".to_string()]);
        assert_eq!(store.exec_calls(), 0);
    }

    // ============================================================
    // SAVE: active / archive migration
    // ============================================================

    #[tokio::test]
    async fn test_closed_account_moves_to_archive_and_back() {
        // ARRANGE
        let (store, engine) = setup();
        let ledger = ledger_with(&["east:c1"]);
        engine.save(&ledger).await.unwrap();

        // ACT: Close
        ledger.write().close_account(&key("east:c1")).unwrap();
        let closed = engine.save(&ledger).await.unwrap();

        // ASSERT
        assert_eq!(closed.status, SaveStatus::Success);
        assert_eq!(closed.keys(), vec!["east:c1".to_string()]);
        assert_eq!(store.members(ACTIVE), vec!["east"]);
        assert_eq!(store.members(ARCHIVE), vec!["east:c1"]);
        assert_eq!(
            stored_account(&store, "east:c1").unwrap().status,
            AccountStatus::Closed
        );

        // ACT: Reactivate
        ledger
            .write()
            .create_account(&key("east:c1"), AccountType::Budget)
            .unwrap();
        let reopened = engine.save(&ledger).await.unwrap();

        // ASSERT
        assert!(reopened.is_success());
        assert!(reopened.keys().is_empty());
        assert_eq!(store.members(ACTIVE), vec!["east", "east:c1"]);
        assert!(store.members(ARCHIVE).is_empty());
    }

    // ============================================================
    // SAVE: out-of-sync accounts
    // ============================================================

    #[tokio::test]
    async fn test_out_of_sync_account_is_skipped() {
        // ARRANGE: Spend above funds marks the account out of sync
        let (store, engine) = setup();
        let mut ledger = AccountLedger::new();
        ledger.create_account(&key("east:s1"), AccountType::Spend).unwrap();
        ledger.sync_shadow(&key("east:s1"), usd(100)).unwrap();
        assert!(ledger.is_account_out_of_sync(&key("east:s1")));
        let ledger = RwLock::new(ledger);

        // ACT
        let result = engine.save(&ledger).await.unwrap();

        // ASSERT
        assert!(result.is_success());
        assert!(stored_account(&store, "east").is_some());
        assert!(stored_account(&store, "east:s1").is_none());
        assert_eq!(store.members(ACTIVE), vec!["east"]);
    }

    // ============================================================
    // SAVE: single-flight and failures
    // ============================================================

    #[tokio::test]
    async fn test_concurrent_save_is_dropped() {
        // ARRANGE
        let (store, engine) = setup();
        store.set_latency(Some(Duration::from_millis(50)));
        let ledger = ledger_with(&["east"]);

        // ACT
        let (first, second) = tokio::join!(engine.save(&ledger), engine.save(&ledger));

        // ASSERT
        assert!(first.is_some(), "The first trigger runs");
        assert!(second.is_none(), "The second trigger is a no-op");
        assert_eq!(store.mget_calls(), 1);
        assert!(!engine.is_saving());
        assert_eq!(engine.phase(), SavePhase::Idle);

        // ACT: The flag is released afterwards
        assert!(engine.save(&ledger).await.is_some());
    }

    #[tokio::test]
    async fn test_backend_failure_is_persistence_error_and_retried() {
        // ARRANGE
        let (store, engine) = setup();
        let ledger = ledger_with(&["east"]);
        store.set_unavailable(true);

        // ACT
        let failed = engine.save(&ledger).await.unwrap();

        // ASSERT
        assert_eq!(failed.status, SaveStatus::PersistenceError);
        assert_eq!(failed.info, "backend unavailable");
        assert!(failed.keys().is_empty());

        // ACT: Next tick, backend is back
        store.set_unavailable(false);
        let retried = engine.save(&ledger).await.unwrap();

        // ASSERT
        assert!(retried.is_success());
        assert_eq!(store.members(ACTIVE), vec!["east"]);
    }

    #[tokio::test]
    async fn test_save_past_deadline_is_timeout() {
        // ARRANGE
        let store = Arc::new(MemoryStore::new());
        store.set_latency(Some(Duration::from_millis(500)));
        let engine = PersistenceEngine::new(store.clone(), StorageKeys::default(), Duration::from_millis(20));
        let ledger = ledger_with(&["east"]);

        // ACT
        let result = engine.save(&ledger).await.unwrap();

        // ASSERT
        assert_eq!(result.status, SaveStatus::PersistenceError);
        assert_eq!(result.info, "timeout");
        assert!(!engine.is_saving());
    }

    #[tokio::test]
    async fn test_custom_key_prefix() {
        // ARRANGE
        let store = Arc::new(MemoryStore::new());
        let engine = PersistenceEngine::new(store.clone(), StorageKeys::new("ledger"), Duration::from_secs(5));
        let ledger = ledger_with(&["east"]);

        // ACT
        engine.save(&ledger).await.unwrap();

        // ASSERT
        assert!(store.get("ledger-east").is_some());
        assert_eq!(store.members("ledger:accounts"), vec!["east"]);
        assert!(store.members(ACTIVE).is_empty());
    }

    // ============================================================
    // LOAD
    // ============================================================

    #[tokio::test]
    async fn test_load_restores_saved_ledger() {
        // ARRANGE
        let (_store, engine) = setup();
        let source = ledger_with(&["east:c1", "west"]);
        source.write().set_budget(&key("east:c1"), usd(250)).unwrap();
        engine.save(&source).await.unwrap();

        // ACT
        let target = RwLock::new(AccountLedger::new());
        let result = engine.load(&target).await;

        // ASSERT
        assert_eq!(result.status, SaveStatus::Success);
        let target = target.read();
        assert_eq!(target.len(), 3);
        let account = target.get_account(&key("east:c1")).unwrap();
        assert_eq!(account.budget, usd(250));
        assert_eq!(account.version, 2);
        assert!(account.is_active());
    }

    #[tokio::test]
    async fn test_load_includes_archived_accounts() {
        // ARRANGE
        let (_store, engine) = setup();
        let source = ledger_with(&["east:c1", "west"]);
        engine.save(&source).await.unwrap();
        source.write().close_account(&key("east:c1")).unwrap();
        let closed = engine.save(&source).await.unwrap();
        assert_eq!(closed.keys(), vec!["east:c1".to_string()]);

        // ACT
        let target = RwLock::new(AccountLedger::new());
        let result = engine.load(&target).await;

        // ASSERT
        assert!(result.is_success());
        let target = target.read();
        assert_eq!(target.keys(), source.read().keys());
        let account = target.get_account(&key("east:c1")).unwrap();
        assert_eq!(account.status, AccountStatus::Closed);
        assert_eq!(account.version, 2);
    }

    #[tokio::test]
    async fn test_recreating_archived_account_after_restart_keeps_saving() {
        // ARRANGE: Save, close, save, then restart into a fresh ledger
        let (store, engine) = setup();
        let source = ledger_with(&["east:c1"]);
        engine.save(&source).await.unwrap();
        source.write().close_account(&key("east:c1")).unwrap();
        engine.save(&source).await.unwrap();

        let restarted = RwLock::new(AccountLedger::new());
        assert!(engine.load(&restarted).await.is_success());

        // ACT: Re-create the account and touch its parent
        let reopened = restarted
            .write()
            .create_account(&key("east:c1"), AccountType::Budget)
            .unwrap();
        restarted.write().set_budget(&key("east"), usd(30)).unwrap();
        let result = engine.save(&restarted).await.unwrap();

        // ASSERT
        assert_eq!(reopened.version, 3, "Reactivated on top of the stored version");
        assert_eq!(result.status, SaveStatus::Success);
        assert_eq!(store.members(ACTIVE), vec!["east", "east:c1"]);
        assert!(store.members(ARCHIVE).is_empty());
        assert_eq!(stored_account(&store, "east:c1").unwrap().version, 3);
        assert_eq!(stored_account(&store, "east").unwrap().budget, usd(30));
    }

    #[tokio::test]
    async fn test_load_missing_archived_value_is_inconsistent() {
        // ARRANGE
        let (store, engine) = setup();
        store.sadd(ARCHIVE, "gone");
        let ledger = RwLock::new(AccountLedger::new());

        // ACT
        let result = engine.load(&ledger).await;

        // ASSERT
        assert_eq!(result.status, SaveStatus::DataInconsistency);
        assert_eq!(result.keys(), vec!["gone".to_string()]);
    }

    #[tokio::test]
    async fn test_load_empty_store_gives_empty_ledger() {
        // ARRANGE
        let (_store, engine) = setup();
        let ledger = ledger_with(&["east"]);

        // ACT
        let result = engine.load(&ledger).await;

        // ASSERT
        assert!(result.is_success());
        assert!(ledger.read().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_value_leaves_ledger_untouched() {
        // ARRANGE
        let (store, engine) = setup();
        store.sadd(ACTIVE, "ghost");
        let ledger = ledger_with(&["east"]);

        // ACT
        let result = engine.load(&ledger).await;

        // ASSERT
        assert_eq!(result.status, SaveStatus::DataInconsistency);
        assert_eq!(result.keys(), vec!["ghost".to_string()]);
        assert_eq!(ledger.read().len(), 1);
        assert!(ledger.read().get_account(&key("east")).is_some());
    }

    #[tokio::test]
    async fn test_load_unreadable_value_is_inconsistent() {
        // ARRANGE
        let (store, engine) = setup();
        store.sadd(ACTIVE, "bad");
        store.set("banker-bad", "not json");
        let ledger = RwLock::new(AccountLedger::new());

        // ACT
        let result = engine.load(&ledger).await;

        // ASSERT
        assert_eq!(result.status, SaveStatus::DataInconsistency);
        assert_eq!(result.keys(), vec!["bad".to_string()]);
        assert!(ledger.read().is_empty());
    }

    #[tokio::test]
    async fn test_load_repairs_missing_parent() {
        // ARRANGE: Only the child is stored
        let (store, engine) = setup();
        let child = Account::new(key("east:c1"), AccountType::Budget);
        store.sadd(ACTIVE, "east:c1");
        store.set("banker-east:c1", &serde_json::to_string(&child).unwrap());
        let ledger = RwLock::new(AccountLedger::new());

        // ACT
        let result = engine.load(&ledger).await;

        // ASSERT
        assert!(result.is_success());
        let ledger = ledger.read();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.account_present_and_active(&key("east")), (true, false));
        assert_eq!(ledger.account_present_and_active(&key("east:c1")), (true, true));
    }

    #[tokio::test]
    async fn test_load_backend_failure_is_persistence_error() {
        // ARRANGE
        let (store, engine) = setup();
        store.set_unavailable(true);
        let ledger = ledger_with(&["east"]);

        // ACT
        let result = engine.load(&ledger).await;

        // ASSERT
        assert_eq!(result.status, SaveStatus::PersistenceError);
        assert_eq!(ledger.read().len(), 1);
    }

    // ============================================================
    // SaveResult
    // ============================================================

    #[test]
    fn test_save_result_serializes_status_in_upper_case() {
        let result = SaveResult::data_inconsistency(&["a:b".to_string()]);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["status"], "DATA_INCONSISTENCY");
        assert_eq!(json["info"], "[\"a:b\"]");
    }
}
