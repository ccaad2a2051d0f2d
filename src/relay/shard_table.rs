use crate::config::{ConfigError, ShardConfig};

/// SDBM string hash, masked to 31 bits.
///
/// Shard ownership must be reproducible by every relay and by the offline
/// resharding tooling, so this function is fixed bit for bit.
pub fn sdbm_hash(input: &str) -> u32 {
    let mut hash: u32 = 0;
    for byte in input.bytes() {
        hash = (byte as u32)
            .wrapping_add(hash << 6)
            .wrapping_add(hash << 16)
            .wrapping_sub(hash);
    }
    hash & 0x7FFF_FFFF
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShardEntry {
    /// Id declared in configuration. Informational only: routing indexes
    /// by slot.
    pub shard_id: i32,
    /// Base URL of the shard, e.g. `http://10.0.0.1:7001`.
    pub endpoint: String,
}

/// Static slot -> endpoint table, fixed for the lifetime of the relay.
#[derive(Debug, Clone)]
pub struct ShardTable {
    entries: Vec<ShardEntry>,
}

impl ShardTable {
    /// Builds the table in configuration order.
    pub fn new(shards: &[ShardConfig]) -> Result<Self, ConfigError> {
        if shards.is_empty() {
            return Err(ConfigError::NoShards);
        }
        let entries = shards
            .iter()
            .map(|shard| {
                tracing::info!("Loading shard {} : {}", shard.shard, shard.uri);
                ShardEntry {
                    shard_id: shard.shard,
                    endpoint: normalize_endpoint(&shard.uri),
                }
            })
            .collect();
        Ok(Self { entries })
    }

    /// Slot owning `parent_account`: `sdbm(parent) mod shard_count`.
    pub fn slot_for(&self, parent_account: &str) -> usize {
        sdbm_hash(parent_account) as usize % self.entries.len()
    }

    pub fn get(&self, slot: usize) -> Option<&ShardEntry> {
        self.entries.get(slot)
    }

    pub fn entries(&self) -> &[ShardEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_endpoint(uri: &str) -> String {
    let trimmed = uri.trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
