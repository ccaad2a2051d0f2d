use crate::router::registry::Router;
use crate::router::types::{HandlerError, Method, RouteError};

use axum::extract::{Extension, Query};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Catch-all handler: every request goes through the route table.
pub async fn handle_ledger_request(
    Extension(router): Extension<Arc<Router>>,
    method: axum::http::Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(method) = Method::from_http(&method) else {
        tracing::debug!("Unsupported method {} {}", method, uri.path());
        return StatusCode::NOT_FOUND.into_response();
    };

    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    render(router.route(method, uri.path(), query, headers, body))
}

/// Maps a routing outcome onto the wire.
///
/// | outcome            | status | body                |
/// |--------------------|--------|---------------------|
/// | body               | 200    | body                |
/// | empty body         | 204    | empty               |
/// | no route           | 404    | empty               |
/// | `NotFound`         | 404    | empty               |
/// | `Validation`       | 500    | `{"message": ...}`  |
/// | `Internal`         | 500    | empty               |
pub fn render(outcome: Result<String, RouteError>) -> Response {
    match outcome {
        Ok(body) if body.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(body) => json_response(StatusCode::OK, body),
        Err(RouteError::NoRoute { method, path }) => {
            tracing::debug!("No route for {} {}", method, path);
            StatusCode::NOT_FOUND.into_response()
        }
        Err(RouteError::Handler(HandlerError::NotFound(what))) => {
            tracing::debug!("Not found: {}", what);
            StatusCode::NOT_FOUND.into_response()
        }
        Err(RouteError::Handler(HandlerError::Validation(message))) => {
            tracing::warn!("Rejected request: {}", message);
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": message }).to_string(),
            )
        }
        Err(RouteError::Handler(HandlerError::Internal(message))) => {
            tracing::error!("Handler failed: {}", message);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn json_response(status: StatusCode, body: String) -> Response {
    let mut response = (status, body).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// The shard's HTTP application.
pub fn ledger_app(router: Arc<Router>) -> axum::Router {
    axum::Router::new()
        .fallback(handle_ledger_request)
        .layer(Extension(router))
}
