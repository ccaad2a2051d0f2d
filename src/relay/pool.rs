//! Upstream Connection Pool
//!
//! Manages a recyclable set of outbound HTTP connections to one shard. Each
//! pooled connection wraps its own single-connection `reqwest::Client`, so the
//! keep-alive socket behind it lives exactly as long as the pooled entry.
//!
//! ## Lifecycle
//! 1. `acquire` hands out the oldest free connection, or opens a new one while
//!    the pool is below `min_connections` or has nothing free.
//! 2. `PooledConnection::prepare` marks the request `Connection: close` on the
//!    last permitted use, `keep-alive` otherwise.
//! 3. Dropping the `PooledConnection` returns it; a connection that reached
//!    `max_uses_before_recycling` is discarded instead.

use super::types::RelayError;

use parking_lot::Mutex;
use reqwest::header::{CONNECTION, HeaderValue};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MIN_CONNECTIONS: usize = 2;
pub const DEFAULT_MAX_USES_BEFORE_RECYCLING: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Connections opened eagerly before free ones are reused.
    pub min_connections: usize,
    /// Requests per connection before it is closed and replaced.
    pub max_uses_before_recycling: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: DEFAULT_MIN_CONNECTIONS,
            max_uses_before_recycling: DEFAULT_MAX_USES_BEFORE_RECYCLING,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently alive, free or in use.
    pub live: usize,
    pub free: usize,
    pub in_use: usize,
    /// Connections ever opened.
    pub created: u64,
    /// Connections closed after reaching their use limit.
    pub recycled: u64,
}

struct Connection {
    id: u64,
    use_count: u32,
    client: reqwest::Client,
}

#[derive(Default)]
struct PoolState {
    free: VecDeque<Connection>,
    live: usize,
    created: u64,
    recycled: u64,
}

pub struct ConnectionPool {
    endpoint: String,
    config: PoolConfig,
    timeout: Option<Duration>,
    state: Mutex<PoolState>,
}

impl ConnectionPool {
    /// Creates an empty pool. No connection is opened until the first
    /// `acquire`.
    pub fn new(endpoint: &str, config: PoolConfig, timeout: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            endpoint: endpoint.to_string(),
            config,
            timeout,
            state: Mutex::new(PoolState::default()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Hands out a connection. Never waits for another request to finish.
    ///
    /// While fewer than `min_connections` are live a new connection is opened
    /// even if free ones exist; after that the oldest free connection is
    /// reused.
    ///
    /// # Returns
    /// * `Ok(PooledConnection)` that goes back to the pool when dropped.
    /// * `Err(RelayError::UpstreamUnavailable)` if a new client cannot be built.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledConnection, RelayError> {
        let mut state = self.state.lock();

        let reusable = if state.live >= self.config.min_connections {
            state.free.pop_front()
        } else {
            None
        };
        let conn = match reusable {
            Some(mut conn) => {
                conn.use_count += 1;
                conn
            }
            None => {
                let conn = Connection {
                    id: state.created,
                    use_count: 1,
                    client: self.build_client()?,
                };
                state.created += 1;
                state.live += 1;
                tracing::debug!("Opened connection {} to {}", conn.id, self.endpoint);
                conn
            }
        };

        Ok(PooledConnection {
            pool: self.clone(),
            id: conn.id,
            use_count: conn.use_count,
            client: conn.client,
            discarded: false,
        })
    }

    fn build_client(&self) -> Result<reqwest::Client, RelayError> {
        let mut builder = reqwest::Client::builder().pool_max_idle_per_host(1);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().map_err(|e| RelayError::UpstreamUnavailable {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        })
    }

    fn is_last_use(&self, conn: &Connection) -> bool {
        conn.use_count >= self.config.max_uses_before_recycling
    }

    fn release(&self, conn: Connection) {
        let mut state = self.state.lock();
        if self.is_last_use(&conn) {
            state.live -= 1;
            state.recycled += 1;
            tracing::debug!(
                "Recycling connection {} to {} after {} uses",
                conn.id,
                self.endpoint,
                conn.use_count
            );
        } else {
            state.free.push_back(conn);
        }
    }

    fn discard(&self, conn: Connection) {
        let mut state = self.state.lock();
        state.live -= 1;
        tracing::debug!("Discarding connection {} to {}", conn.id, self.endpoint);
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            live: state.live,
            free: state.free.len(),
            in_use: state.live - state.free.len(),
            created: state.created,
            recycled: state.recycled,
        }
    }
}

/// A connection borrowed from a pool for exactly one request. Returned to
/// the pool when dropped.
pub struct PooledConnection {
    pool: Arc<ConnectionPool>,
    id: u64,
    use_count: u32,
    client: reqwest::Client,
    discarded: bool,
}

impl PooledConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    /// Whether this request may leave the connection open afterwards.
    pub fn keep_alive(&self) -> bool {
        self.use_count < self.pool.config.max_uses_before_recycling
    }

    pub fn endpoint(&self) -> &str {
        self.pool.endpoint()
    }

    /// Starts a request on this connection with the connection header
    /// already set.
    pub fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.prepare(self.client.request(method, url))
    }

    /// Sets `Connection: close` on the last permitted use of this
    /// connection, `keep-alive` otherwise. Must run before every send.
    pub fn prepare(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let value = if self.keep_alive() {
            HeaderValue::from_static("keep-alive")
        } else {
            HeaderValue::from_static("close")
        };
        builder.header(CONNECTION, value)
    }

    /// Closes the connection instead of returning it, e.g. after a
    /// transport error left it in an unknown state.
    pub fn discard(mut self) {
        self.discarded = true;
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = Connection {
            id: self.id,
            use_count: self.use_count,
            client: self.client.clone(),
        };
        if self.discarded {
            self.pool.discard(conn);
        } else {
            self.pool.release(conn);
        }
    }
}
