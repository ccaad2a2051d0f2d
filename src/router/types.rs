use std::collections::HashMap;
use thiserror::Error;

/// HTTP verbs the ledger API understands. Anything else never routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn from_http(method: &axum::http::Method) -> Option<Self> {
        match *method {
            axum::http::Method::GET => Some(Method::Get),
            axum::http::Method::POST => Some(Method::Post),
            axum::http::Method::PUT => Some(Method::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// Everything a handler gets to see about a routed request.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    /// Account segment of the path, `"*"` for collection-wide routes.
    pub account: String,
    pub body: String,
}

/// Where a path points to, before the handler table is consulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub account: String,
    pub action: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum HandlerError {
    /// Bad query parameter, unknown account type, unusable body.
    /// Rendered as 500 with a `{"message": ...}` body.
    #[error("{0}")]
    Validation(String),

    /// Rendered as 404 with an empty body.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rendered as 500 with an empty body.
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("no route for {method} {path}")]
    NoRoute { method: String, path: String },

    #[error(transparent)]
    Handler(#[from] HandlerError),
}
