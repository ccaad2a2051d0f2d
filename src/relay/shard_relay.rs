use super::aggregate::merge_replies;
use super::pool::ConnectionPool;
use super::shard_table::ShardTable;
use super::types::*;

use crate::config::{ConfigError, RelayConfig};
use crate::ledger::types::parent_account_of;
use crate::router::protocol::*;
use crate::router::types::Method;

use axum::http::{HeaderMap, header};
use std::sync::Arc;
use tokio::task::JoinSet;
use uuid::Uuid;

/// Headers that describe the inbound hop and must not be copied upstream.
const HOP_BY_HOP_HEADERS: [header::HeaderName; 6] = [
    header::HOST,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::TE,
    header::UPGRADE,
];

/// Stateless front of the shard tier: forwards per-account requests to the
/// owning shard and fans global queries out to every shard.
pub struct ShardRelay {
    paths: RoutePaths,
    table: ShardTable,
    pools: Vec<Arc<ConnectionPool>>,
}

impl ShardRelay {
    pub fn new(config: &RelayConfig) -> Result<Self, ConfigError> {
        let table = ShardTable::new(&config.shards)?;
        let pools = table
            .entries()
            .iter()
            .map(|entry| ConnectionPool::new(&entry.endpoint, config.pool, config.upstream_timeout))
            .collect();

        Ok(Self {
            paths: RoutePaths::new(&config.api_prefix),
            table,
            pools,
        })
    }

    pub fn table(&self) -> &ShardTable {
        &self.table
    }

    pub fn pool(&self, slot: usize) -> Option<&Arc<ConnectionPool>> {
        self.pools.get(slot)
    }

    /// Derives the parent account a request belongs to, `"*"` for the
    /// global listings.
    pub fn parent_account(&self, request: &RelayRequest) -> Result<String, RelayError> {
        let unresolved = || RelayError::Resolution {
            method: request.method.to_string(),
            path: request.path.clone(),
        };

        let method = Method::from_http(&request.method).ok_or_else(unresolved)?;
        let path = request.path.as_str();

        if self.paths.is_global(path) {
            return match method {
                Method::Get => Ok(ALL_ACCOUNTS.to_string()),
                Method::Post if path == self.paths.accounts => request
                    .query
                    .get(QUERY_ACCOUNT_NAME)
                    .map(|name| parent_account_of(name))
                    .filter(|parent| !parent.is_empty())
                    .map(str::to_string)
                    .ok_or_else(unresolved),
                _ => Err(unresolved()),
            };
        }

        let resolved = self.paths.resolve(path).ok_or_else(unresolved)?;
        let action = resolved.action.as_str();
        let routable = match method {
            Method::Get => action == ACTION_COLLECTION || READ_ACTIONS.contains(&action),
            Method::Post | Method::Put => WRITE_ACTIONS.contains(&action),
        };
        let parent = parent_account_of(&resolved.account);
        if !routable || parent.is_empty() || resolved.account == ALL_ACCOUNTS {
            return Err(unresolved());
        }
        Ok(parent.to_string())
    }

    /// Handles one inbound request end to end.
    ///
    /// # Returns
    /// * `Ok(ShardReply)` with the owning shard's status and body, or the
    ///   merged replies of a fan-out.
    /// * `Err(RelayError::Resolution)` if no parent account can be derived.
    /// * `Err(RelayError::UpstreamUnavailable)` if the owning shard failed.
    /// * `Err(RelayError::NoReplies)` if every shard of a fan-out failed.
    pub async fn relay(&self, request: RelayRequest) -> Result<ShardReply, RelayError> {
        let parent = match self.parent_account(&request) {
            Ok(parent) => parent,
            Err(e) => {
                tracing::error!("{}", e);
                return Err(e);
            }
        };

        if parent == ALL_ACCOUNTS {
            self.multiple_shoot(request).await
        } else {
            let slot = self.table.slot_for(&parent);
            tracing::debug!(
                "{} {} -> parent {} -> shard slot {}",
                request.method,
                request.path,
                parent,
                slot
            );
            self.single_shoot(slot, request).await
        }
    }

    async fn single_shoot(&self, slot: usize, request: RelayRequest) -> Result<ShardReply, RelayError> {
        let pool = self.pools[slot % self.pools.len()].clone();
        dispatch(pool, Arc::new(request)).await
    }

    /// Sends the request to every shard in parallel and merges the replies
    /// in arrival order.
    async fn multiple_shoot(&self, request: RelayRequest) -> Result<ShardReply, RelayError> {
        let request_id = Uuid::new_v4();
        let description = format!("{} {}", request.method, request.path_and_query());
        let request = Arc::new(request);

        tracing::debug!(
            "Fan-out {} [{}] to {} shards",
            description,
            request_id,
            self.pools.len()
        );

        let mut in_flight = JoinSet::new();
        for pool in &self.pools {
            in_flight.spawn(dispatch(pool.clone(), request.clone()));
        }

        let mut replies = Vec::with_capacity(self.pools.len());
        while let Some(outcome) = in_flight.join_next().await {
            match outcome {
                Ok(Ok(reply)) => replies.push(reply),
                Ok(Err(e)) => {
                    tracing::error!("Fan-out [{}] lost a shard: {}", request_id, e);
                }
                Err(e) => {
                    tracing::error!("Fan-out [{}] task failed: {}", request_id, e);
                }
            }
        }

        tracing::debug!(
            "Fan-out [{}] collected {}/{} replies",
            request_id,
            replies.len(),
            self.pools.len()
        );

        merge_replies(&replies).ok_or(RelayError::NoReplies(description))
    }
}

/// One upstream round trip on a pooled connection. The connection goes back
/// to its pool when this returns, whatever the outcome.
async fn dispatch(pool: Arc<ConnectionPool>, request: Arc<RelayRequest>) -> Result<ShardReply, RelayError> {
    let conn = pool.acquire()?;
    let url = format!("{}{}", pool.endpoint(), request.path_and_query());

    let sent = conn
        .request(request.method.clone(), &url)
        .headers(forwardable_headers(&request.headers))
        .body(request.body.clone())
        .send()
        .await;

    let response = match sent {
        Ok(response) => response,
        Err(e) => {
            conn.discard();
            return Err(RelayError::UpstreamUnavailable {
                endpoint: pool.endpoint().to_string(),
                reason: e.to_string(),
            });
        }
    };

    let status = response.status();
    match response.bytes().await {
        Ok(body) => Ok(ShardReply { status, body }),
        Err(e) => {
            conn.discard();
            Err(RelayError::UpstreamUnavailable {
                endpoint: pool.endpoint().to_string(),
                reason: e.to_string(),
            })
        }
    }
}

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP_HEADERS.iter() {
        out.remove(name);
    }
    out
}
