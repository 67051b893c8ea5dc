use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

use crate::blockchain::pow::DEFAULT_DIFFICULTY;

/// Placeholder secret a node falls back to when none is configured. Fine
/// for a single node on localhost, useless as soon as peers are involved.
pub const DEFAULT_SECRET: &str = "change-me";

/// Runtime settings, read once at startup from `NFTCHAIN_*` environment
/// variables. Every field has a workable single-node default.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Interface the HTTP server binds to.
    pub host: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Base address peers use to reach this node, e.g. `http://10.0.0.2:8080`.
    pub public_url: String,
    /// Shared secret for signing peer RPC.
    pub secret: String,
    /// Path of the ledger snapshot file.
    pub data_file: PathBuf,
    /// Address of an existing node to join through, if any.
    pub bootstrap: Option<String>,
    /// How often the periodic chain sync runs.
    pub sync_interval: Duration,
    /// When set, the node mines on its own at this interval.
    pub auto_mine_interval: Option<Duration>,
    /// Account credited with rewards for blocks this node auto-mines.
    pub miner_account: String,
    /// Leading zero hex digits required of a block digest.
    pub difficulty: usize,
    /// Per-request timeout for calls to peers.
    pub peer_timeout: Duration,
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                warn!("ignoring {}={:?}: {}", key, raw, e);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_or(key, default))
}

impl Default for NodeConfig {
    fn default() -> Self {
        let host = "127.0.0.1".to_string();
        let port = 8080;
        NodeConfig {
            public_url: format!("http://{}:{}", host, port),
            host,
            port,
            secret: DEFAULT_SECRET.to_string(),
            data_file: PathBuf::from("data/ledger.json"),
            bootstrap: None,
            sync_interval: Duration::from_secs(60),
            auto_mine_interval: None,
            miner_account: "node".to_string(),
            difficulty: DEFAULT_DIFFICULTY,
            peer_timeout: Duration::from_secs(5),
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> Self {
        let defaults = NodeConfig::default();

        let host = env_or("NFTCHAIN_HOST", defaults.host);
        let port = env_or("NFTCHAIN_PORT", defaults.port);
        let public_url =
            env::var("NFTCHAIN_PUBLIC_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let secret = env::var("NFTCHAIN_SECRET").unwrap_or_else(|_| {
            warn!("NFTCHAIN_SECRET is not set, peer RPC uses the built-in placeholder secret");
            defaults.secret
        });

        let bootstrap = env::var("NFTCHAIN_BOOTSTRAP").ok().filter(|v| !v.is_empty());

        let auto_mine_interval = match env_or("NFTCHAIN_AUTO_MINE_SECS", 0u64) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        NodeConfig {
            host,
            port,
            public_url,
            secret,
            data_file: env_or("NFTCHAIN_DATA_FILE", defaults.data_file),
            bootstrap,
            sync_interval: env_secs("NFTCHAIN_SYNC_INTERVAL_SECS", 60),
            auto_mine_interval,
            miner_account: env_or("NFTCHAIN_MINER_ACCOUNT", defaults.miner_account),
            difficulty: env_or("NFTCHAIN_DIFFICULTY", defaults.difficulty),
            peer_timeout: env_secs("NFTCHAIN_PEER_TIMEOUT_SECS", 5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_describe_a_single_local_node() {
        let config = NodeConfig::default();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.public_url, "http://127.0.0.1:8080");
        assert_eq!(config.difficulty, DEFAULT_DIFFICULTY);
        assert!(config.bootstrap.is_none());
        assert!(config.auto_mine_interval.is_none());
        assert_eq!(config.sync_interval, Duration::from_secs(60));
    }
}
