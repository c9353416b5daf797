//! Log decoding for the core and TWAMM contracts.
//!
//! `Swapped` and `VirtualOrdersExecuted` are emitted as anonymous,
//! tightly packed logs and are recognised by their data length. The other
//! events are regular ABI-encoded logs matched on topic0.

use alloy::{
    primitives::{aliases::U96, Address, Log, B256, U256},
    sol_types::SolEvent,
};
use log::debug;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::{
    abis::{OrderUpdated, PositionUpdated},
    math::compact_to_fixed,
    pools::{PoolConfig, PoolKey},
};

/// locker (20) | poolId (32) | delta0 (16) | delta1 (16) | liquidityAfter (16) | sqrtRatioAfter (12) | tickAfter (4)
pub const SWAPPED_LOG_LEN: usize = 116;

/// poolId (32) | saleRateToken0 (14) | saleRateToken1 (14)
pub const VIRTUAL_ORDERS_EXECUTED_LOG_LEN: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TopicKind {
    PositionUpdated,
    OrderUpdated,
}

static TOPICS: Lazy<FxHashMap<B256, TopicKind>> = Lazy::new(|| {
    FxHashMap::from_iter([
        (PositionUpdated::SIGNATURE_HASH, TopicKind::PositionUpdated),
        (OrderUpdated::SIGNATURE_HASH, TopicKind::OrderUpdated),
    ])
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swapped {
    pub locker: Address,
    pub pool_id: B256,
    pub delta0: i128,
    pub delta1: i128,
    pub liquidity_after: u128,
    pub sqrt_ratio_after: U256,
    pub tick_after: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualOrdersExecuted {
    pub pool_id: B256,
    pub token0_sale_rate: u128,
    pub token1_sale_rate: u128,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EkuboEvent {
    Swapped(Swapped),
    PositionUpdated(PositionUpdated),
    VirtualOrdersExecuted(VirtualOrdersExecuted),
    OrderUpdated(OrderUpdated),
}

impl EkuboEvent {
    /// Pool the event belongs to. `emitter` is the address that emitted the
    /// log; TWAMM order keys only name the pool through it.
    pub fn pool_id(&self, emitter: Address) -> B256 {
        match self {
            Self::Swapped(event) => event.pool_id,
            Self::PositionUpdated(event) => event.poolId,
            Self::VirtualOrdersExecuted(event) => event.pool_id,
            Self::OrderUpdated(event) => PoolKey::new(
                event.orderKey.sellToken,
                event.orderKey.buyToken,
                PoolConfig::new(emitter, event.orderKey.fee, 0),
            )
            .id(),
        }
    }
}

/// Decodes a log of the core contract at `core`.
///
/// `None` for logs of other emitters and for logs that are not core events.
pub fn parse_core_log(log: &Log, core: Address) -> Option<EkuboEvent> {
    if log.address != core {
        return None;
    }
    match decode_log(log)? {
        event @ (EkuboEvent::Swapped(_) | EkuboEvent::PositionUpdated(_)) => Some(event),
        _ => {
            debug!("Ignoring non-core event shape from core {}", core);
            None
        },
    }
}

/// Decodes a log of the TWAMM extension at `twamm`.
pub fn parse_twamm_log(log: &Log, twamm: Address) -> Option<EkuboEvent> {
    if log.address != twamm {
        return None;
    }
    match decode_log(log)? {
        event @ (EkuboEvent::VirtualOrdersExecuted(_) | EkuboEvent::OrderUpdated(_)) => Some(event),
        _ => {
            debug!("Ignoring non-TWAMM event shape from extension {}", twamm);
            None
        },
    }
}

/// Decodes a log of either contract. Logs from any other address are `None`,
/// so anonymous logs of the same length from elsewhere are never misread.
pub fn parse_log(log: &Log, core: Address, twamm: Address) -> Option<EkuboEvent> {
    parse_core_log(log, core).or_else(|| parse_twamm_log(log, twamm))
}

/// Classifies a log by shape alone.
fn decode_log(log: &Log) -> Option<EkuboEvent> {
    let data = log.data.data.as_ref();
    let Some(topic0) = log.data.topics().first() else {
        return match data.len() {
            SWAPPED_LOG_LEN => Some(EkuboEvent::Swapped(parse_swapped(data))),
            VIRTUAL_ORDERS_EXECUTED_LOG_LEN => {
                Some(EkuboEvent::VirtualOrdersExecuted(parse_virtual_orders_executed(data)))
            },
            len => {
                debug!("Ignoring anonymous log of {} bytes from {}", len, log.address);
                None
            },
        };
    };

    match TOPICS.get(topic0)? {
        TopicKind::PositionUpdated => PositionUpdated::decode_log_data(&log.data)
            .map(EkuboEvent::PositionUpdated)
            .map_err(|e| debug!("Failed to decode PositionUpdated from {}: {}", log.address, e))
            .ok(),
        TopicKind::OrderUpdated => OrderUpdated::decode_log_data(&log.data)
            .map(EkuboEvent::OrderUpdated)
            .map_err(|e| debug!("Failed to decode OrderUpdated from {}: {}", log.address, e))
            .ok(),
    }
}

fn be_bytes<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}

/// Unsigned integer of `len <= 16` big-endian bytes.
fn be_u128(data: &[u8], offset: usize, len: usize) -> u128 {
    let mut out = [0u8; 16];
    out[16 - len..].copy_from_slice(&data[offset..offset + len]);
    u128::from_be_bytes(out)
}

fn parse_swapped(data: &[u8]) -> Swapped {
    Swapped {
        locker: Address::from_slice(&data[0..20]),
        pool_id: B256::from_slice(&data[20..52]),
        delta0: i128::from_be_bytes(be_bytes(data, 52)),
        delta1: i128::from_be_bytes(be_bytes(data, 68)),
        liquidity_after: u128::from_be_bytes(be_bytes(data, 84)),
        sqrt_ratio_after: compact_to_fixed(U96::from_be_slice(&data[100..112])),
        tick_after: i32::from_be_bytes(be_bytes(data, 112)),
    }
}

fn parse_virtual_orders_executed(data: &[u8]) -> VirtualOrdersExecuted {
    VirtualOrdersExecuted {
        pool_id: B256::from_slice(&data[0..32]),
        token0_sale_rate: be_u128(data, 32, 14),
        token1_sale_rate: be_u128(data, 46, 14),
    }
}
