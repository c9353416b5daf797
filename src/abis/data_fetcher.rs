use alloy::sol;

sol! {
    #![sol(all_derives)]

    struct PoolKey {
        address token0;
        address token1;
        bytes32 config;
    }

    struct TickDelta {
        int32 number;
        int128 liquidityDelta;
    }

    struct QuoteData {
        int32 tick;
        uint96 sqrtRatio;
        uint128 liquidity;
        int32 minTick;
        int32 maxTick;
        TickDelta[] ticks;
    }

    struct SaleRateDelta {
        uint64 time;
        int112 saleRateDelta0;
        int112 saleRateDelta1;
    }

    struct TwammPoolState {
        uint96 sqrtRatio;
        int32 tick;
        uint128 liquidity;
        uint32 lastVirtualOrderExecutionTime;
        uint112 saleRateToken0;
        uint112 saleRateToken1;
        SaleRateDelta[] saleRateDeltas;
    }

    #[sol(rpc)]
    interface IQuoteDataFetcher {
        function getQuoteData(PoolKey[] calldata poolKeys, uint32 minTickSpacings) external returns (QuoteData[] memory results);
    }

    #[sol(rpc)]
    interface ITwammDataFetcher {
        function getPoolState(PoolKey memory poolKey) external view returns (TwammPoolState memory state);
    }
}
