use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The pool could not produce a connection, or the shard did not answer.
    #[error("upstream {endpoint} unavailable: {reason}")]
    UpstreamUnavailable { endpoint: String, reason: String },

    /// No parent account could be derived from the request.
    #[error("cannot resolve parent account for {method} {path}")]
    Resolution { method: String, path: String },

    /// None of the shards produced a usable reply to a fan-out.
    #[error("no shard replied to {0}")]
    NoReplies(String),
}

/// An inbound request as the relay clones it onto each upstream call.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub method: Method,
    pub path: String,
    /// Raw query string without the leading `?`.
    pub raw_query: Option<String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RelayRequest {
    pub fn path_and_query(&self) -> String {
        match &self.raw_query {
            Some(query) if !query.is_empty() => format!("{}?{}", self.path, query),
            _ => self.path.clone(),
        }
    }
}

/// Status and body of one shard's answer, passed through verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardReply {
    pub status: StatusCode,
    pub body: Bytes,
}
