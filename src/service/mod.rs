//! Ledger Service Module
//!
//! The process behind each shard endpoint.
//!
//! ## Core Concepts
//! - **Routing**: Every request is resolved by the shared `Router` into an
//!   account and an action, then run against the live ledger.
//! - **Persistence**: The ledger is loaded once at startup, saved on a timer,
//!   and saved one last time on shutdown.
//!
//! ## Submodules
//! - **`service`**: `LedgerService`, wiring ledger, routes and persistence.
//! - **`routes`**: The ledger route table.
//! - **`handlers`**: The axum catch-all handler and response rendering.

pub mod handlers;
pub mod routes;
pub mod service;
