/// A pool topology that cannot be activated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no pools configured")]
    NoPools,
    #[error("replenish period must be non-zero")]
    ZeroPeriod,
    #[error("pool order {order} outside {min}..={max}")]
    OrderOutOfRange { order: u32, min: u32, max: u32 },
    #[error("pool for order {order} has zero capacity")]
    ZeroCapacity { order: u32 },
    #[error("more than one pool for order {order}")]
    DuplicateOrder { order: u32 },
}

/// Activation failed; the subsystem stays off.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to reserve slot storage for the order-{order} pool")]
    SlotStorage { order: u32 },
}
