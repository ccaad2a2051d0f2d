//! Request Router Module
//!
//! Pure `(method, path) -> (handler, account)` resolution for the ledger API.
//!
//! ## Submodules
//! - **`protocol`**: Endpoint paths, action names and the path classifier. The
//!   relay reuses the classifier to find the parent account of a request.
//! - **`registry`**: The `(Method, action)` handler table.
//! - **`types`**: Closed `Method` enum, request/response shapes, error taxonomy.

pub mod protocol;
pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;
