//! Budget Ledger Tier Library
//!
//! This library crate defines the modules shared by the two binaries: the
//! shard process (`main.rs`) and the relay (`bin/ledger_relay.rs`).
//!
//! ## Architecture Modules
//! - **`relay`**: The stateless routing tier. Hashes the parent account of
//!   each request onto a static shard table, forwards it over pooled
//!   connections, and fans global listings out to every shard.
//! - **`router`**: Pure `(method, path) -> (handler, account)` resolution,
//!   shared by the shard and the relay.
//! - **`ledger`**: The hierarchical account tree and the interface the rest of
//!   the system uses to reach it.
//! - **`persistence`**: Two-phase, version-checked reconciliation of a ledger
//!   with a key-value store.
//! - **`service`**: A shard process: ledger, routes, persistence timer.
//! - **`config`**: Command-line and file configuration for both binaries.

pub mod config;
pub mod ledger;
pub mod persistence;
pub mod relay;
pub mod router;
pub mod service;
