//! Binary exponential over 64.64 fixed-point numbers.

use alloy::primitives::U256;

/// Exclusive upper bound of the exponent: results must stay below 2^64.
pub const EXP2_CEILING: u128 = 64 << 64;

// Fractional parts of 2^(2^-k) in X128 for k = 1..=64; the integer part is 1.
const FRACTION_FACTORS: [u128; 64] = [
    0x6a09e667f3bcc908b2fb1366ea957d3e,
    0x306fe0a31b7152de8d5a46305c85edec,
    0x172b83c7d517adcdf7c8c50eb14a7920,
    0x0b5586cf9890f6298b92b71842a98364,
    0x059b0d31585743ae7c548eb68ca417fe,
    0x02c9a3e778060ee6f7caca4f7a29bde9,
    0x0163da9fb33356d84a66ae336dcdfa40,
    0x00b1afa5abcbed6129ab13ec11dc9544,
    0x0058c86da1c09ea1ff19d294cf2f679c,
    0x002c605e2e8cec506d21bfc89a23a010,
    0x00162f3904051fa128bca9c55c31e5e0,
    0x000b175effdc76ba38e31671ca939726,
    0x00058ba01fb9f96d6cacd4b180917c3e,
    0x0002c5cc37da9491d0985c348c68e7b3,
    0x000162e525ee054754457d5995292026,
    0x0000b17255775c040618bf4a4ade83fc,
    0x000058b91b5bc9ae2eed81e9b7d4cfac,
    0x00002c5c89d5ec6ca4d7c8acc017b7c9,
    0x0000162e43f4f831060e02d839a9d16d,
    0x00000b1721bcfc99d9f890ea06911763,
    0x0000058b90cf1e6d97f9ca14dbcc1628,
    0x000002c5c863b73f016468f6bac5ca2c,
    0x00000162e430e5a18f6119e3c02282a5,
    0x000000b1721835514b86e6d96efd1bff,
    0x00000058b90c0b48c6be5df846c5b2f0,
    0x0000002c5c8601cc6b9e94213c72737a,
    0x000000162e42fff037df38aa2b219f06,
    0x0000000b17217fba9c739aa5819f44f9,
    0x000000058b90bfcdee5acd3c1cedc823,
    0x00000002c5c85fe31f35a6a30da1be50,
    0x0000000162e42ff0999ce3541b9fffcf,
    0x00000000b17217f80f4ef5aadda45554,
    0x0000000058b90bfbf8479bd5a81b51ad,
    0x000000002c5c85fdf84bd62ae30a74cc,
    0x00000000162e42fefb2fed257559bdaa,
    0x000000000b17217f7d5a7716bba4a9af,
    0x00000000058b90bfbe9ddbac5e109ccf,
    0x0000000002c5c85fdf4b15de6f17eb0d,
    0x000000000162e42fefa494f1478fde05,
    0x0000000000b17217f7d20cf927c8e94c,
    0x000000000058b90bfbe8f71cb4e4b33e,
    0x00000000002c5c85fdf477b662b26945,
    0x0000000000162e42fefa3ae53369388c,
    0x00000000000b17217f7d1d351a389d40,
    0x0000000000058b90bfbe8e8b2d3d4ede,
    0x000000000002c5c85fdf4741bea6e77f,
    0x00000000000162e42fefa39fe95583c3,
    0x000000000000b17217f7d1cfb72b45e2,
    0x00000000000058b90bfbe8e7cc35c3f1,
    0x0000000000002c5c85fdf473e242ea38,
    0x000000000000162e42fefa39f02b772c,
    0x0000000000000b17217f7d1cf7d83c1a,
    0x000000000000058b90bfbe8e7bdcbe2e,
    0x00000000000002c5c85fdf473dea871f,
    0x0000000000000162e42fefa39ef44d91,
    0x00000000000000b17217f7d1cf79e949,
    0x0000000000000058b90bfbe8e7bce544,
    0x000000000000002c5c85fdf473de6eca,
    0x00000000000000162e42fefa39ef366f,
    0x000000000000000b17217f7d1cf79afa,
    0x00000000000000058b90bfbe8e7bcd6d,
    0x0000000000000002c5c85fdf473de6b2,
    0x000000000000000162e42fefa39ef358,
    0x0000000000000000b17217f7d1cf79ac,
];

/// `2^x` for a non-negative 64.64 exponent, as 64.64.
///
/// Returns `None` when `x >= 64`, where the result no longer fits.
pub fn exp2(x: u128) -> Option<u128> {
    if x >= EXP2_CEILING {
        return None;
    }

    let mut result = U256::from(1u64) << 127;
    for (k, fraction) in FRACTION_FACTORS.iter().enumerate() {
        if x & (1u128 << (63 - k)) != 0 {
            result += (result * U256::from(*fraction)) >> 128;
        }
    }

    let integer_part = (x >> 64) as usize;
    u128::try_from(result >> (63 - integer_part)).ok()
}
