//! Sharding Relay Module
//!
//! Stateless routing tier in front of the ledger shards.
//!
//! ## Core Concepts
//! - **Ownership**: The parent account (first segment of an account key) is
//!   hashed with SDBM; `hash mod shard_count` picks the owning slot.
//! - **Forwarding**: Per-account requests are cloned onto a pooled upstream
//!   connection and the shard's status and body are passed back verbatim.
//! - **Fan-out**: Global listings go to every shard in parallel; array replies
//!   are concatenated and object replies unioned, in arrival order.
//!
//! ## Submodules
//! - **`shard_table`**: SDBM hash and the static slot table.
//! - **`pool`**: Per-shard recyclable connection pools.
//! - **`shard_relay`**: Single-shard and fan-out dispatch.
//! - **`aggregate`**: Fan-out reply merging.
//! - **`handlers`**: The axum catch-all handler.

pub mod aggregate;
pub mod handlers;
pub mod pool;
pub mod shard_relay;
pub mod shard_table;
pub mod types;
