//! Persistence Module
//!
//! Keeps each shard's ledger durable in a key-value store.
//!
//! ## Core Concepts
//! - **Two-phase save**: read everything, decide, then write everything in one
//!   transaction. Version checks in the read phase stop a stale process from
//!   overwriting newer data.
//! - **Active and archive sets**: open accounts are indexed in the active set
//!   and closed ones move to the archive set. Load reads both, so closed
//!   accounts keep their stored version across restarts.
//! - **Single-flight**: one save cycle at a time per engine.
//!
//! ## Submodules
//! - **`engine`**: Save and load cycles.
//! - **`store`**: The `KvStore` backend trait.
//! - **`redis_store`**: Redis backend.
//! - **`memory`**: In-process backend.

pub mod engine;
pub mod memory;
pub mod redis_store;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;
