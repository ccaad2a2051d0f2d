//! Process Configuration
//!
//! Typed configuration for the two binaries. Each struct is built once at
//! startup from `--flag value` pairs and handed to the components that need
//! it; nothing here is global.

use crate::relay::pool::PoolConfig;
use crate::router::protocol::DEFAULT_API_PREFIX;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_RELAY_BIND: &str = "0.0.0.0:8989";
pub const DEFAULT_RELAY_CONFIG: &str = "relay-config.json";
pub const DEFAULT_SHARD_BIND: &str = "0.0.0.0:7001";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/1";
pub const DEFAULT_KEY_PREFIX: &str = "banker";
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_SAVE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing value for {0}")]
    MissingValue(String),

    #[error("invalid value {value:?} for {flag}: {reason}")]
    InvalidValue {
        flag: String,
        value: String,
        reason: String,
    },

    #[error("unknown store {0:?} (expected memory or redis)")]
    UnknownStore(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("shard table is empty")]
    NoShards,
}

/// One entry of the relay configuration file:
/// `[{"shard": 0, "uri": "10.0.0.1:7001"}, ...]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShardConfig {
    pub shard: i32,
    pub uri: String,
}

pub fn load_shard_configs(path: &Path) -> Result<Vec<ShardConfig>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let shards: Vec<ShardConfig> = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    if shards.is_empty() {
        return Err(ConfigError::NoShards);
    }
    Ok(shards)
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: SocketAddr,
    pub api_prefix: String,
    pub shards: Vec<ShardConfig>,
    pub pool: PoolConfig,
    pub upstream_timeout: Option<Duration>,
}

impl RelayConfig {
    pub fn new(shards: Vec<ShardConfig>) -> Self {
        Self {
            bind: default_addr(DEFAULT_RELAY_BIND),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            shards,
            pool: PoolConfig::default(),
            upstream_timeout: Some(DEFAULT_UPSTREAM_TIMEOUT),
        }
    }

    /// Builds the relay configuration from command line arguments
    /// (without the program name). The shard list comes from the JSON file
    /// named by `--relay-config`.
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut config = Self::new(Vec::new());
        let mut shard_file = PathBuf::from(DEFAULT_RELAY_CONFIG);

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--bind" => config.bind = parse_value(flag, value_of(args, i)?)?,
                "--relay-config" => shard_file = PathBuf::from(value_of(args, i)?),
                "--api-prefix" => config.api_prefix = value_of(args, i)?.to_string(),
                "--min-connections" => {
                    config.pool.min_connections = parse_value(flag, value_of(args, i)?)?
                }
                "--max-uses" => {
                    config.pool.max_uses_before_recycling = parse_value(flag, value_of(args, i)?)?
                }
                "--upstream-timeout-ms" => {
                    let ms: u64 = parse_value(flag, value_of(args, i)?)?;
                    config.upstream_timeout = (ms > 0).then(|| Duration::from_millis(ms));
                }
                _ => {
                    tracing::warn!("Ignoring unknown argument {}", flag);
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }

        config.shards = load_shard_configs(&shard_file)?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    /// In-process store, lost on restart. For development and tests.
    Memory,
    Redis { url: String },
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub api_prefix: String,
    pub store: StoreConfig,
    pub key_prefix: String,
    pub save_interval: Duration,
    pub save_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: default_addr(DEFAULT_SHARD_BIND),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            store: StoreConfig::Redis {
                url: DEFAULT_REDIS_URL.to_string(),
            },
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            save_interval: DEFAULT_SAVE_INTERVAL,
            save_timeout: DEFAULT_SAVE_TIMEOUT,
        }
    }
}

impl ServiceConfig {
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut store = "redis".to_string();
        let mut redis_url = DEFAULT_REDIS_URL.to_string();

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--bind" => config.bind = parse_value(flag, value_of(args, i)?)?,
                "--api-prefix" => config.api_prefix = value_of(args, i)?.to_string(),
                "--store" => store = value_of(args, i)?.to_string(),
                "--redis-url" => redis_url = value_of(args, i)?.to_string(),
                "--key-prefix" => config.key_prefix = value_of(args, i)?.to_string(),
                "--save-interval-ms" => config.save_interval = parse_nonzero_millis(flag, value_of(args, i)?)?,
                "--save-timeout-ms" => config.save_timeout = parse_nonzero_millis(flag, value_of(args, i)?)?,
                _ => {
                    tracing::warn!("Ignoring unknown argument {}", flag);
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }

        config.store = match store.as_str() {
            "memory" => StoreConfig::Memory,
            "redis" => StoreConfig::Redis { url: redis_url },
            other => return Err(ConfigError::UnknownStore(other.to_string())),
        };
        Ok(config)
    }
}

fn value_of(args: &[String], i: usize) -> Result<&str, ConfigError> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| ConfigError::MissingValue(args[i].clone()))
}

fn parse_value<T>(flag: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_nonzero_millis(flag: &str, value: &str) -> Result<Duration, ConfigError> {
    match parse_value::<u64>(flag, value)? {
        0 => Err(ConfigError::InvalidValue {
            flag: flag.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        ms => Ok(Duration::from_millis(ms)),
    }
}

fn default_addr(addr: &str) -> SocketAddr {
    addr.parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_service_config_defaults() {
        let config = ServiceConfig::from_args(&[]).unwrap();

        assert_eq!(config.bind, "0.0.0.0:7001".parse::<SocketAddr>().unwrap());
        assert_eq!(config.api_prefix, "/v1");
        assert_eq!(config.key_prefix, "banker");
        assert_eq!(
            config.store,
            StoreConfig::Redis {
                url: DEFAULT_REDIS_URL.to_string()
            }
        );
    }

    #[test]
    fn test_service_config_flags() {
        let config = ServiceConfig::from_args(&args(&[
            "--bind",
            "127.0.0.1:7100",
            "--store",
            "memory",
            "--save-interval-ms",
            "250",
        ]))
        .unwrap();

        assert_eq!(config.bind.port(), 7100);
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.save_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_service_config_rejects_unknown_store() {
        let result = ServiceConfig::from_args(&args(&["--store", "cassandra"]));
        assert!(matches!(result, Err(ConfigError::UnknownStore(_))));
    }

    #[test]
    fn test_missing_flag_value() {
        let result = ServiceConfig::from_args(&args(&["--bind"]));
        assert!(matches!(result, Err(ConfigError::MissingValue(_))));
    }

    #[test]
    fn test_zero_save_durations_are_rejected() {
        for flag in ["--save-interval-ms", "--save-timeout-ms"] {
            let result = ServiceConfig::from_args(&args(&["--store", "memory", flag, "0"]));
            assert!(
                matches!(&result, Err(ConfigError::InvalidValue { flag: f, .. }) if f == flag),
                "{} 0 must be rejected",
                flag
            );
        }
        assert!(ServiceConfig::from_args(&args(&["--save-timeout-ms", "-5"])).is_err());
    }

    #[test]
    fn test_relay_config_reads_shard_file() {
        let path = std::env::temp_dir().join(format!("relay-config-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"[{"shard": 0, "uri": "127.0.0.1:7001"}, {"shard": 3, "uri": "127.0.0.1:7002"}]"#,
        )
        .unwrap();

        let config = RelayConfig::from_args(&args(&[
            "--relay-config",
            path.to_str().unwrap(),
            "--min-connections",
            "4",
        ]))
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.shards.len(), 2);
        assert_eq!(config.shards[1].shard, 3);
        assert_eq!(config.pool.min_connections, 4);
    }

    #[test]
    fn test_empty_shard_file_is_rejected() {
        let path = std::env::temp_dir().join(format!("relay-config-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[]").unwrap();

        let result = load_shard_configs(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ConfigError::NoShards)));
    }
}
