use super::store::KvStore;
use super::types::{KvCommand, KvError};

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Redis-backed store. The connection manager reconnects on its own after a
/// dropped connection; calls in the meantime fail with `KvError::Backend`.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let conn = ConnectionManager::new(client).await.map_err(backend)?;
        tracing::info!("Connected to redis at {}", url);
        Ok(Self { conn })
    }
}

fn backend(e: redis::RedisError) -> KvError {
    KvError::Backend(e.to_string())
}

#[async_trait]
impl KvStore for RedisStore {
    async fn smembers(&self, set: &str) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        conn.smembers(set).await.map_err(backend)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(backend)
    }

    async fn exec(&self, commands: Vec<KvCommand>) -> Result<(), KvError> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in &commands {
            match command {
                KvCommand::Set { key, value } => {
                    pipe.set(key, value).ignore();
                }
                KvCommand::SAdd { set, member } => {
                    pipe.sadd(set, member).ignore();
                }
                KvCommand::SMove {
                    source,
                    destination,
                    member,
                } => {
                    pipe.smove(source, destination, member).ignore();
                }
            }
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(backend)?;
        Ok(())
    }
}
