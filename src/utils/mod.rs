//! Small helpers shared by the pools and the service.
//!
//! - [`conversion`] - Lossy U256 to f64 conversions
//! - [`price`] - Decimal-adjusted prices from square-root ratios

mod conversion;
mod price;

pub use conversion::{u256_to_f64, x128_to_f64};
pub use price::sqrt_ratio_to_price;
