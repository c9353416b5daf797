use alloy::sol;

sol! {
    #![sol(all_derives)]

    struct OrderKey {
        address sellToken;
        address buyToken;
        uint64 fee;
        uint64 startTime;
        uint64 endTime;
    }

    event OrderUpdated(address owner, bytes32 salt, OrderKey orderKey, int112 saleRateDelta);
}
