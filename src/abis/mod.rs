pub mod core;
pub mod data_fetcher;
pub mod multicall;
pub mod twamm;

pub use self::core::{Bounds, PositionUpdated, UpdatePositionParameters};
pub use data_fetcher::{
    IQuoteDataFetcher, ITwammDataFetcher, PoolKey as AbiPoolKey, QuoteData, SaleRateDelta,
    TickDelta, TwammPoolState as AbiTwammPoolState,
};
pub use multicall::IMulticall3;
pub use twamm::{OrderKey, OrderUpdated};
