#[allow(clippy::module_inception)]
mod config;

pub use self::config::{
    CacheSettings, EkuboSettings, PoolSettings, RpcSettings, Settings, SyncSettings,
};
