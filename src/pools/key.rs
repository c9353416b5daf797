//! Pool identity.
//!
//! A pool is addressed by `keccak256(abi.encode(token0, token1, config))`,
//! where `config` packs the extension, fee and tick spacing into one word.

use alloy::primitives::{keccak256, Address, B256};
use alloy::sol_types::SolValue;
use serde::Deserialize;

use crate::abis::AbiPoolKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
pub struct PoolConfig {
    pub extension: Address,
    /// Fraction of the input taken as fee, in 0.64 fixed point.
    pub fee: u64,
    /// Zero for full range pools.
    pub tick_spacing: u32,
}

impl PoolConfig {
    pub fn new(extension: Address, fee: u64, tick_spacing: u32) -> Self {
        Self {
            extension,
            fee,
            tick_spacing,
        }
    }

    /// `extension (20 bytes) | fee (8 bytes) | tick_spacing (4 bytes)`
    pub fn to_word(&self) -> B256 {
        let mut word = [0u8; 32];
        word[..20].copy_from_slice(self.extension.as_slice());
        word[20..28].copy_from_slice(&self.fee.to_be_bytes());
        word[28..].copy_from_slice(&self.tick_spacing.to_be_bytes());
        B256::from(word)
    }

    pub fn from_word(word: B256) -> Self {
        let bytes = word.as_slice();
        let mut fee = [0u8; 8];
        fee.copy_from_slice(&bytes[20..28]);
        let mut tick_spacing = [0u8; 4];
        tick_spacing.copy_from_slice(&bytes[28..]);
        Self {
            extension: Address::from_slice(&bytes[..20]),
            fee: u64::from_be_bytes(fee),
            tick_spacing: u32::from_be_bytes(tick_spacing),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub token0: Address,
    pub token1: Address,
    pub config: PoolConfig,
}

impl PoolKey {
    /// Sorts the tokens: the lower address is token0.
    pub fn new(token_a: Address, token_b: Address, config: PoolConfig) -> Self {
        let (token0, token1) = if token_a < token_b { (token_a, token_b) } else { (token_b, token_a) };
        Self {
            token0,
            token1,
            config,
        }
    }

    pub fn id(&self) -> B256 {
        keccak256((self.token0, self.token1, self.config.to_word()).abi_encode())
    }

    pub fn has_token(&self, token: Address) -> bool {
        token == self.token0 || token == self.token1
    }

    pub fn to_abi(&self) -> AbiPoolKey {
        AbiPoolKey {
            token0: self.token0,
            token1: self.token1,
            config: self.config.to_word(),
        }
    }
}

/// Which pricing engine a pool needs, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Base,
    FullRange,
    Oracle,
    Twamm,
}

/// Known extension addresses of one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extensions {
    pub oracle: Address,
    pub twamm: Address,
}

impl PoolKind {
    pub fn of(key: &PoolKey, extensions: &Extensions) -> Self {
        let extension = key.config.extension;
        if extension != Address::ZERO && extension == extensions.oracle {
            Self::Oracle
        } else if extension != Address::ZERO && extension == extensions.twamm {
            Self::Twamm
        } else if key.config.tick_spacing == 0 {
            Self::FullRange
        } else {
            Self::Base
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    const TOKEN_A: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    const TOKEN_B: Address = address!("0000000000000000000000000000000000000000");
    const ORACLE: Address = address!("51d02a5948496a67827242eabc5725531342527c");
    const TWAMM: Address = address!("d4279c050da1f5c5b2830558c7a08e57e12b54ec");

    #[test]
    fn test_pool_id_sorting() {
        // Same inputs in different order should produce the same pool ID
        let config = PoolConfig::new(Address::ZERO, 1 << 60, 100);
        let id1 = PoolKey::new(TOKEN_A, TOKEN_B, config).id();
        let id2 = PoolKey::new(TOKEN_B, TOKEN_A, config).id();
        assert_eq!(id1, id2);

        let key = PoolKey::new(TOKEN_A, TOKEN_B, config);
        assert_eq!(key.token0, TOKEN_B);
        assert_eq!(key.token1, TOKEN_A);
    }

    #[test]
    fn test_pool_id_depends_on_config() {
        let base = PoolKey::new(TOKEN_A, TOKEN_B, PoolConfig::new(Address::ZERO, 0, 100));
        let other_fee = PoolKey::new(TOKEN_A, TOKEN_B, PoolConfig::new(Address::ZERO, 1, 100));
        let other_spacing = PoolKey::new(TOKEN_A, TOKEN_B, PoolConfig::new(Address::ZERO, 0, 0));
        assert_ne!(base.id(), other_fee.id());
        assert_ne!(base.id(), other_spacing.id());
    }

    #[test]
    fn test_config_word_layout() {
        let config = PoolConfig::new(TWAMM, 0x0102_0304_0506_0708, 0x0a0b_0c0d);
        let word = config.to_word();
        assert_eq!(&word[..20], TWAMM.as_slice());
        assert_eq!(&word[20..28], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&word[28..], &[0x0a, 0x0b, 0x0c, 0x0d]);
        assert_eq!(PoolConfig::from_word(word), config);
    }

    #[test]
    fn test_pool_kind() {
        let extensions = Extensions {
            oracle: ORACLE,
            twamm: TWAMM,
        };
        let kind = |extension, tick_spacing| {
            PoolKind::of(
                &PoolKey::new(TOKEN_A, TOKEN_B, PoolConfig::new(extension, 0, tick_spacing)),
                &extensions,
            )
        };
        assert_eq!(kind(Address::ZERO, 100), PoolKind::Base);
        assert_eq!(kind(Address::ZERO, 0), PoolKind::FullRange);
        assert_eq!(kind(ORACLE, 0), PoolKind::Oracle);
        assert_eq!(kind(TWAMM, 0), PoolKind::Twamm);
    }
}
