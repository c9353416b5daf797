//! Tick to sqrt ratio conversion.
//!
//! A tick `t` corresponds to the price `1.000001^t`; the sqrt ratio is
//! `sqrt(1.000001^t) * 2^128`, truncated to a representable value.

use alloy::primitives::U256;
use thiserror::Error;

use super::{sqrt_ratio::round_to_representable, uint::Q128};

pub const MIN_TICK: i32 = -88_722_835;
pub const MAX_TICK: i32 = 88_722_835;

/// `tick_to_sqrt_ratio(MIN_TICK)`
pub const MIN_SQRT_RATIO: U256 = U256::from_limbs([0x0001_96a0_5dfe_b89c, 1, 0, 0]);
/// `tick_to_sqrt_ratio(MAX_TICK)`
pub const MAX_SQRT_RATIO: U256 =
    U256::from_limbs([0, 0x6906_a28c_0000_0000, 0xfffe_6962_27de_541a, 0]);

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TickError {
    #[error("tick {0} is outside the supported range")]
    OutOfRange(i32),
}

// round(2^128 / 1.000001^(2^i / 2)) for each bit i of |tick|
const TICK_MULTIPLIERS: [u128; 27] = [
    0xfffff79c8499329c7cbb2510d893283b,
    0xffffef390978c398134b4ff3764fe410,
    0xffffde72140b00a354bd3dc828e976c9,
    0xffffbce42c7be6c998ad6318193c0b18,
    0xffff79c86a8f6150a32d9778eceef97c,
    0xfffef3911b7cff24ba1b3dbb5f8f5974,
    0xfffde72350725cc4ea8feece3b5f13c8,
    0xfffbce4b06c196e9247ac87695d53c60,
    0xfff79ca7a4d1bf1ee8556cea23cdbaa5,
    0xffef3995a5b6a6267530f207142a5764,
    0xffde7444b28145508125d10077ba83b8,
    0xffbceceeb791747f10df216f2e53ec57,
    0xff79eb706b9a64c6431d76e63531e929,
    0xfef41d1a5f2ae3a20676bec6f7f9459a,
    0xfde95287d26d81bea159c37073122c73,
    0xfbd701c7cbc4c8a6bb81efd232d1e4e7,
    0xf7bf5211c72f5185f372aeb1d48f937e,
    0xefc2bf59df33ecc28125cf78ec4f167f,
    0xe08d35706200796273f0b3a981d90cfd,
    0xc4f76b68947482dc198a48a54348c4ed,
    0x978bcb9894317807e5fa4498eee7c0fa,
    0x59b63684b86e9f486ec54727371ba6ca,
    0x1f703399d88f6aa83a28b22d4a1f56e3,
    0x3dc5dac7376e20fc8679758d1bcdcfc,
    0xee7e32d61fdb0a5e622b820f681d0,
    0xde2ee4bc381afa7089aa84bb66,
    0xc0d55d4d7152c25fb139,
];

pub fn tick_to_sqrt_ratio(tick: i32) -> Result<U256, TickError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(TickError::OutOfRange(tick));
    }

    let magnitude = tick.unsigned_abs();
    let mut ratio = Q128;
    for (bit, multiplier) in TICK_MULTIPLIERS.iter().enumerate() {
        if magnitude & (1 << bit) != 0 {
            ratio = (ratio * U256::from(*multiplier)) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Every tick in range maps below 2^192.
    round_to_representable(ratio, false).ok_or(TickError::OutOfRange(tick))
}
