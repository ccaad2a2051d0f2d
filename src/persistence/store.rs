//! Key-value backend interface used by the persistence engine.

use super::types::{KvCommand, KvError};

use async_trait::async_trait;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Members of a set, in no particular order (`SMEMBERS`).
    async fn smembers(&self, set: &str) -> Result<Vec<String>, KvError>;

    /// Values for `keys`, positionally; `None` where a key is absent (`MGET`).
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, KvError>;

    /// Applies every command or none of them (`MULTI`/`EXEC`).
    async fn exec(&self, commands: Vec<KvCommand>) -> Result<(), KvError>;
}
