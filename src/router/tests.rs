//! Router Module Tests
//!
//! ## Test Scopes
//! - **Path resolution**: Account and action extraction, special paths, prefixes.
//! - **Registry**: Registration, lookup by method and action, handler errors.

#[cfg(test)]
mod tests {
    use crate::router::protocol::*;
    use crate::router::registry::Router;
    use crate::router::types::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn resolved(account: &str, action: &str) -> Option<ResolvedPath> {
        Some(ResolvedPath {
            account: account.to_string(),
            action: action.to_string(),
        })
    }

    fn route(router: &Router, method: Method, path: &str) -> Result<String, RouteError> {
        router.route(method, path, HashMap::new(), HashMap::new(), String::new())
    }

    // ============================================================
    // PATH RESOLUTION
    // ============================================================

    #[test]
    fn test_resolve_collection_account_and_action() {
        let paths = RoutePaths::default();

        assert_eq!(paths.resolve("/v1/accounts"), resolved("*", ""));
        assert_eq!(paths.resolve("/v1/accounts/east:c1"), resolved("east:c1", ""));
        assert_eq!(
            paths.resolve("/v1/accounts/east:c1/budget"),
            resolved("east:c1", "budget")
        );
    }

    #[test]
    fn test_resolve_special_paths() {
        let paths = RoutePaths::default();

        assert_eq!(paths.resolve("/v1/activeaccounts"), resolved("*", "activeaccounts"));
        assert_eq!(paths.resolve("/v1/summary"), resolved("*", "summary"));
        assert!(paths.is_global("/v1/accounts"));
        assert!(paths.is_global("/v1/summary"));
        assert!(!paths.is_global("/v1/accounts/east"));
    }

    #[test]
    fn test_resolve_rejects_unknown_shapes() {
        let paths = RoutePaths::default();

        assert_eq!(paths.resolve("/v1/accounts/a/b/c"), None);
        assert_eq!(paths.resolve("/v1/accountsfoo"), None);
        assert_eq!(paths.resolve("/v1/other"), None);
        assert_eq!(paths.resolve("/accounts/east"), None);
    }

    #[test]
    fn test_custom_and_empty_prefix() {
        let custom = RoutePaths::new("/api/");
        let bare = RoutePaths::new("");

        assert_eq!(custom.accounts, "/api/accounts");
        assert_eq!(custom.resolve("/api/accounts/east"), resolved("east", ""));
        assert_eq!(bare.resolve("/accounts/east/children"), resolved("east", "children"));
        assert_eq!(bare.resolve("/summary"), resolved("*", "summary"));
    }

    #[test]
    fn test_method_from_http() {
        assert_eq!(Method::from_http(&axum::http::Method::GET), Some(Method::Get));
        assert_eq!(Method::from_http(&axum::http::Method::POST), Some(Method::Post));
        assert_eq!(Method::from_http(&axum::http::Method::PUT), Some(Method::Put));
        assert_eq!(Method::from_http(&axum::http::Method::DELETE), None);
        assert_eq!(Method::Put.as_str(), "PUT");
    }

    // ============================================================
    // REGISTRY
    // ============================================================

    #[test]
    fn test_register_and_route() {
        // ARRANGE
        let router = Router::new(DEFAULT_API_PREFIX);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        router.register(Method::Get, ACTION_CHILDREN, move |req: &RouteRequest| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(format!("[\"{}\"]", req.account))
        });

        // ASSERT: Registered
        assert!(router.has_route(Method::Get, ACTION_CHILDREN));
        assert!(!router.has_route(Method::Post, ACTION_CHILDREN));
        assert_eq!(router.route_count(), 1);

        // ACT
        let body = route(&router, Method::Get, "/v1/accounts/east:c1/children");

        // ASSERT
        assert_eq!(body, Ok("[\"east:c1\"]".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_method_is_part_of_the_key() {
        let router = Router::new(DEFAULT_API_PREFIX);
        router.register(Method::Post, ACTION_BUDGET, |_req: &RouteRequest| Ok("post".to_string()));
        router.register(Method::Put, ACTION_BUDGET, |_req: &RouteRequest| Ok("put".to_string()));

        assert_eq!(route(&router, Method::Post, "/v1/accounts/a/budget"), Ok("post".to_string()));
        assert_eq!(route(&router, Method::Put, "/v1/accounts/a/budget"), Ok("put".to_string()));
        assert!(matches!(
            route(&router, Method::Get, "/v1/accounts/a/budget"),
            Err(RouteError::NoRoute { .. })
        ));
    }

    #[test]
    fn test_unregistered_action_is_no_route() {
        let router = Router::new(DEFAULT_API_PREFIX);

        let result = route(&router, Method::Get, "/v1/accounts/east");

        assert_eq!(
            result,
            Err(RouteError::NoRoute {
                method: "GET".to_string(),
                path: "/v1/accounts/east".to_string(),
            })
        );
    }

    #[test]
    fn test_handler_receives_query_and_body() {
        // ARRANGE
        let router = Router::new(DEFAULT_API_PREFIX);
        router.register(Method::Post, ACTION_COLLECTION, |req: &RouteRequest| {
            let name = req.query.get(QUERY_ACCOUNT_NAME).cloned().unwrap_or_default();
            Ok(format!("{}|{}|{}", req.account, name, req.body))
        });
        let query = HashMap::from([(QUERY_ACCOUNT_NAME.to_string(), "east".to_string())]);

        // ACT
        let body = router.route(
            Method::Post,
            "/v1/accounts",
            query,
            HashMap::new(),
            "payload".to_string(),
        );

        // ASSERT
        assert_eq!(body, Ok("*|east|payload".to_string()));
    }

    #[test]
    fn test_handler_errors_propagate() {
        let router = Router::new(DEFAULT_API_PREFIX);
        router.register(Method::Get, ACTION_SUBTREE, |_req: &RouteRequest| {
            Err(HandlerError::Validation("nope".to_string()))
        });

        let result = route(&router, Method::Get, "/v1/accounts/east/subtree");

        assert_eq!(
            result,
            Err(RouteError::Handler(HandlerError::Validation("nope".to_string())))
        );
    }

    #[test]
    fn test_registering_twice_replaces_handler() {
        let router = Router::new(DEFAULT_API_PREFIX);
        router.register(Method::Get, ACTION_SUMMARY, |_req: &RouteRequest| Ok("old".to_string()));
        router.register(Method::Get, ACTION_SUMMARY, |_req: &RouteRequest| Ok("new".to_string()));

        assert_eq!(router.route_count(), 1);
        assert_eq!(route(&router, Method::Get, "/v1/summary"), Ok("new".to_string()));
    }
}
