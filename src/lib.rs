pub mod abis;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod lens;
pub mod math;
pub mod multicall;
pub mod pools;
pub mod subscriber;
pub mod utils;
pub mod worker;

pub use config::Settings;
pub use error::{PricingError, QuoteError, SubscriberError};
pub use multicall::{AlloyMulticall, Call, MulticallExecutor};
pub use pools::{EkuboPool, PoolKey, PoolRegistry, Quote, QuoteRequest};
pub use subscriber::{BlockHeader, EventSubscriber, StatefulSubscriber};
pub use worker::SyncWorker;
