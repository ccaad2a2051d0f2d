use super::shard_relay::ShardRelay;
use super::types::RelayRequest;

use axum::body::Bytes;
use axum::extract::{Extension, Query};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::sync::Arc;

/// Catch-all handler: every inbound request is relayed.
pub async fn handle_relay(
    Extension(relay): Extension<Arc<ShardRelay>>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RelayRequest {
        method,
        path: uri.path().to_string(),
        raw_query: uri.query().map(str::to_string),
        query,
        headers,
        body,
    };

    match relay.relay(request).await {
        Ok(reply) if reply.body.is_empty() => reply.status.into_response(),
        Ok(reply) => {
            let mut response = (reply.status, reply.body).into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(e) => {
            tracing::error!("Relay failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// The relay's HTTP application.
pub fn relay_app(relay: Arc<ShardRelay>) -> axum::Router {
    axum::Router::new()
        .fallback(handle_relay)
        .layer(Extension(relay))
}
