use alloy::sol;

sol! {
    #![sol(all_derives)]

    struct Bounds {
        int32 lower;
        int32 upper;
    }

    struct UpdatePositionParameters {
        bytes32 salt;
        Bounds bounds;
        int128 liquidityDelta;
    }

    event PositionUpdated(address locker, bytes32 poolId, UpdatePositionParameters params, int128 delta0, int128 delta1);
}
