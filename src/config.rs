//! Configuration for the wallet core
//!
//! Loaded from TOML with environment-variable overrides for secrets.
//! Optional fields carry serde defaults so deployments only specify what
//! they tune.

use crate::chain::ChainId;
use crate::stream::connection::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Streaming endpoints and tuning
    pub streaming: StreamingConfig,

    /// Per-chain RPC endpoints keyed by chain id (`evm:1`, `solana:mainnet`)
    pub chains: HashMap<String, ChainRpcConfig>,

    /// Send-pipeline tuning
    #[serde(default)]
    pub send: SendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Endpoint serving the positions and pulse feeds
    pub positions_ws_url: String,

    /// Transaction-stream endpoint for EVM chains
    pub evm_transactions_ws_url: String,

    /// Transaction-stream endpoint for Solana
    pub solana_transactions_ws_url: String,

    /// API key stamped into every subscribe envelope
    pub api_key: String,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_reconnect_base_delay")]
    pub reconnect_base_delay_ms: u64,

    #[serde(default = "default_reconnect_cap_delay")]
    pub reconnect_cap_delay_ms: u64,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Debounce window for update batching
    #[serde(default = "default_batch_debounce")]
    pub batch_debounce_ms: u64,

    /// Hard ceiling between first unflushed update and flush
    #[serde(default = "default_batch_max_delay")]
    pub batch_max_delay_ms: u64,
}

impl StreamingConfig {
    /// Connection tuning for one of the streaming endpoints
    pub fn connection(&self, url: &str) -> ConnectionConfig {
        ConnectionConfig {
            url: url.to_string(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            reconnect_base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            reconnect_cap_delay: Duration::from_millis(self.reconnect_cap_delay_ms),
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }

    pub fn batch_debounce(&self) -> Duration {
        Duration::from_millis(self.batch_debounce_ms)
    }

    pub fn batch_max_delay(&self) -> Duration {
        Duration::from_millis(self.batch_max_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainRpcConfig {
    /// JSON-RPC endpoint for the chain
    pub rpc_url: String,

    /// Native asset ticker when it differs from the family default
    /// (e.g. POL on Polygon)
    #[serde(default)]
    pub native_symbol: Option<String>,

    /// Explorer base URL for building result links
    #[serde(default)]
    pub explorer_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendConfig {
    /// Timeout for light RPC calls (nonce, blockhash, account info)
    #[serde(default = "default_light_timeout")]
    pub light_timeout_secs: u64,

    /// Timeout for heavier calls (gas estimation, block fetch)
    #[serde(default = "default_heavy_timeout")]
    pub heavy_timeout_secs: u64,

    /// Timeout for broadcast calls
    #[serde(default = "default_broadcast_timeout")]
    pub broadcast_timeout_secs: u64,

    /// Client-side retry count passed to the Solana RPC node
    #[serde(default = "default_broadcast_retries")]
    pub max_broadcast_retries: usize,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            light_timeout_secs: default_light_timeout(),
            heavy_timeout_secs: default_heavy_timeout(),
            broadcast_timeout_secs: default_broadcast_timeout(),
            max_broadcast_retries: default_broadcast_retries(),
        }
    }
}

// Default value functions
fn default_ping_interval() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_reconnect_base_delay() -> u64 {
    500
}
fn default_reconnect_cap_delay() -> u64 {
    30_000
}
fn default_max_reconnect_attempts() -> u32 {
    8
}
fn default_batch_debounce() -> u64 {
    150
}
fn default_batch_max_delay() -> u64 {
    1_000
}
fn default_light_timeout() -> u64 {
    10
}
fn default_heavy_timeout() -> u64 {
    30
}
fn default_broadcast_timeout() -> u64 {
    60
}
fn default_broadcast_retries() -> usize {
    3
}

impl CoreConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CoreConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment overrides
    ///
    /// `WALLET_CORE_API_KEY` overrides the streaming API key so secrets can
    /// stay out of the TOML file.
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        if let Ok(api_key) = std::env::var("WALLET_CORE_API_KEY") {
            config.streaming.api_key = api_key;
        }
        Ok(config)
    }

    /// Reject configurations that cannot work before any socket is opened
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.streaming.positions_ws_url.is_empty()
            || self.streaming.evm_transactions_ws_url.is_empty()
            || self.streaming.solana_transactions_ws_url.is_empty()
        {
            anyhow::bail!("streaming endpoint URLs must not be empty");
        }
        if self.streaming.max_reconnect_attempts == 0 {
            anyhow::bail!("max_reconnect_attempts must be at least 1");
        }
        if self.streaming.batch_max_delay_ms < self.streaming.batch_debounce_ms {
            anyhow::bail!("batch_max_delay_ms must be >= batch_debounce_ms");
        }
        for (chain, rpc) in &self.chains {
            chain
                .parse::<ChainId>()
                .map_err(|e| anyhow::anyhow!("bad chain key in [chains]: {}", e))?;
            if rpc.rpc_url.is_empty() {
                anyhow::bail!("rpc_url for {} must not be empty", chain);
            }
        }
        Ok(())
    }

    /// RPC settings for a chain, if configured
    pub fn chain(&self, chain: &ChainId) -> Option<&ChainRpcConfig> {
        self.chains.get(&chain.to_string())
    }
}
