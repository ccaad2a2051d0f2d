//! Ledger Module
//!
//! The account tree each shard holds in memory.
//!
//! ## Core Concepts
//! - **Account keys**: Colon-separated paths (`east:campaign1`). The first
//!   segment is the parent account and decides which shard owns the subtree.
//! - **Versions**: Every mutation bumps the account version. Persistence
//!   refuses to overwrite a stored record with an older one.
//! - **Interface**: Persistence only sees a ledger through the `Ledger` and
//!   `LedgerAccount` traits.
//!
//! ## Submodules
//! - **`types`**: Keys, accounts, currency pools, errors.
//! - **`interface`**: The `Ledger` / `LedgerAccount` traits.
//! - **`accounts`**: `AccountLedger`, the in-memory implementation.

pub mod accounts;
pub mod interface;
pub mod types;
