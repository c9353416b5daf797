use std::time::Duration;

use alloy::primitives::Address;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::pools::{Deployment, Extensions, PoolConfig, PoolKey};

/// JSON-RPC endpoint and multicall transport.
#[derive(Debug, Deserialize, Clone)]
pub struct RpcSettings {
    pub url: String,
    /// Overrides the canonical Multicall3 deployment.
    #[serde(default)]
    pub multicall_address: Option<Address>,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl RpcSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Ekubo contract addresses.
///
/// Extensions left unset disable the pool kinds that depend on them.
#[derive(Debug, Deserialize, Clone)]
pub struct EkuboSettings {
    pub core: Address,
    pub quote_data_fetcher: Address,
    #[serde(default)]
    pub twamm_data_fetcher: Address,
    #[serde(default)]
    pub oracle: Address,
    #[serde(default)]
    pub twamm: Address,
    #[serde(default = "default_min_tick_spacings")]
    pub min_tick_spacings: u32,
}

fn default_min_tick_spacings() -> u32 {
    2
}

impl EkuboSettings {
    pub fn deployment(&self) -> Deployment {
        Deployment {
            core: self.core,
            quote_data_fetcher: self.quote_data_fetcher,
            twamm_data_fetcher: self.twamm_data_fetcher,
            extensions: Extensions {
                oracle: self.oracle,
                twamm: self.twamm,
            },
            min_tick_spacings: self.min_tick_spacings,
        }
    }
}

/// Snapshot retention.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    /// Blocks behind the head that stay answerable; also the deepest reorg
    /// handled without a regeneration.
    #[serde(default = "default_retention_blocks")]
    pub retention_blocks: u64,
}

fn default_retention_blocks() -> u64 {
    64
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            retention_blocks: default_retention_blocks(),
        }
    }
}

/// Chain following.
#[derive(Debug, Deserialize, Clone)]
pub struct SyncSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_milliseconds: u64,
    /// Largest block range requested in one `eth_getLogs` call.
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    #[serde(default = "default_regeneration_cooldown")]
    pub regeneration_cooldown_secs: u64,
}

fn default_poll_interval() -> u64 {
    1_000
}

fn default_max_block_range() -> u64 {
    1_000
}

fn default_regeneration_cooldown() -> u64 {
    30
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_milliseconds: default_poll_interval(),
            max_block_range: default_max_block_range(),
            regeneration_cooldown_secs: default_regeneration_cooldown(),
        }
    }
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_milliseconds)
    }

    pub fn regeneration_cooldown(&self) -> Duration {
        Duration::from_secs(self.regeneration_cooldown_secs)
    }
}

/// A pool to track. Token order does not matter.
#[derive(Debug, Deserialize, Clone)]
pub struct PoolSettings {
    pub token_a: Address,
    pub token_b: Address,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub tick_spacing: u32,
    #[serde(default)]
    pub extension: Address,
}

impl PoolSettings {
    pub fn key(&self) -> PoolKey {
        PoolKey::new(
            self.token_a,
            self.token_b,
            PoolConfig::new(self.extension, self.fee, self.tick_spacing),
        )
    }
}

/// Root application configuration.
///
/// Loaded from `config.{yaml,toml,json}` in the working directory, with
/// `EKUBO__SECTION__FIELD` environment variables taking precedence.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rpc: RpcSettings,
    pub ekubo: EkuboSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub pools: Vec<PoolSettings>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("EKUBO").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
