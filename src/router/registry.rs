//! Route Registry
//!
//! Maps `(Method, action)` pairs to handlers. The action is the trailing path
//! segment after the account name (`budget`, `children`, ...) or the empty
//! string for the bare collection. Resolution is pure: no I/O happens here,
//! handlers run synchronously inside `route`.

use super::protocol::RoutePaths;
use super::types::*;

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Uniform contract every route implements.
pub trait Handler: Send + Sync {
    fn handle(&self, req: &RouteRequest) -> Result<String, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&RouteRequest) -> Result<String, HandlerError> + Send + Sync,
{
    fn handle(&self, req: &RouteRequest) -> Result<String, HandlerError> {
        self(req)
    }
}

pub type HandlerFn = Arc<dyn Handler>;

pub struct Router {
    paths: RoutePaths,
    handlers: DashMap<(Method, String), HandlerFn>,
}

impl Router {
    /// Creates an empty router for endpoints under `api_prefix`.
    pub fn new(api_prefix: &str) -> Self {
        Self {
            paths: RoutePaths::new(api_prefix),
            handlers: DashMap::new(),
        }
    }

    /// Binds `handler` to `method` + `action`, replacing any previous binding.
    ///
    /// # Arguments
    /// * `method` - The request method the handler answers.
    /// * `action` - The trailing path segment (e.g., "budget"), or "" for the
    ///   bare collection and the account itself.
    /// * `handler` - Closure implementing the route.
    pub fn register<F>(&self, method: Method, action: &str, handler: F)
    where
        F: Fn(&RouteRequest) -> Result<String, HandlerError> + Send + Sync + 'static,
    {
        self.register_handler(method, action, Arc::new(handler));
    }

    pub fn register_handler(&self, method: Method, action: &str, handler: HandlerFn) {
        tracing::debug!("Registering route: {} [{}]", method.as_str(), action);
        self.handlers.insert((method, action.to_string()), handler);
    }

    /// Finds the handler and account for a request without running it.
    pub fn resolve(&self, method: Method, path: &str) -> Result<(HandlerFn, String), RouteError> {
        let no_route = || RouteError::NoRoute {
            method: method.as_str().to_string(),
            path: path.to_string(),
        };

        let resolved = self.paths.resolve(path).ok_or_else(no_route)?;
        tracing::trace!(
            "Resolved {} -> account [{}], action [{}]",
            path,
            resolved.account,
            resolved.action
        );

        let handler = self
            .handlers
            .get(&(method, resolved.action))
            .map(|entry| entry.value().clone())
            .ok_or_else(no_route)?;

        Ok((handler, resolved.account))
    }

    /// Resolves and invokes the handler for a request.
    ///
    /// # Returns
    /// * `Ok(body)` with the handler's output; an empty body means no content.
    /// * `Err(RouteError::NoRoute)` if the path or the `(method, action)` pair
    ///   is unknown.
    /// * `Err(RouteError::Handler)` if the handler rejected the request.
    pub fn route(
        &self,
        method: Method,
        path: &str,
        query: HashMap<String, String>,
        headers: HashMap<String, String>,
        body: String,
    ) -> Result<String, RouteError> {
        let (handler, account) = self.resolve(method, path)?;
        let request = RouteRequest {
            path: path.to_string(),
            query,
            headers,
            account,
            body,
        };
        Ok(handler.handle(&request)?)
    }

    pub fn has_route(&self, method: Method, action: &str) -> bool {
        self.handlers.contains_key(&(method, action.to_string()))
    }

    pub fn route_count(&self) -> usize {
        self.handlers.len()
    }
}
