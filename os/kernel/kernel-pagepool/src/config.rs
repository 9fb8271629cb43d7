//! Pool topology and replenish cadence.
//!
//! The topology is fixed once the allocator is activated; there is no runtime
//! reconfiguration.

use crate::error::ConfigError;
use alloc::vec::Vec;
use core::time::Duration;

/// Size of one base page in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// Number of block orders the page source knows about (`0..MAX_ORDER`).
pub const MAX_ORDER: u32 = 11;

/// `MAX_ORDER` as an array length.
pub const ORDER_COUNT: usize = MAX_ORDER as usize;

/// Lowest order a pool may serve. Single pages are left to the upstream allocator.
pub const MIN_POOL_ORDER: u32 = 1;

/// Highest order a pool may serve.
pub const MAX_POOL_ORDER: u32 = MAX_ORDER - 1;

/// How long the replenisher sleeps when nobody wakes it.
pub const DEFAULT_REPLENISH_PERIOD: Duration = Duration::from_secs(1);

/// Pools used when nothing else is configured.
pub const DEFAULT_POOLS: [PoolConfig; 3] = [
    PoolConfig::new(1, 512, 128),
    PoolConfig::new(2, 256, 64),
    PoolConfig::new(3, 128, 32),
];

/// Whether `order` lies in the range a pool can serve.
#[inline]
#[must_use]
pub const fn is_pool_order(order: u32) -> bool {
    order >= MIN_POOL_ORDER && order <= MAX_POOL_ORDER
}

/// Shape of one pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Block order served by the pool.
    pub order: u32,
    /// Low-water mark: minimum number of free blocks the page source must
    /// report at `order` before the replenisher takes another one.
    pub threshold: u64,
    /// Number of slots.
    pub capacity: usize,
}

impl PoolConfig {
    #[must_use]
    pub const fn new(order: u32, threshold: u64, capacity: usize) -> Self {
        Self {
            order,
            threshold,
            capacity,
        }
    }
}

/// Full configuration of a [`PoolAllocator`](crate::PoolAllocator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePoolConfig {
    pub pools: Vec<PoolConfig>,
    pub period: Duration,
}

impl Default for PagePoolConfig {
    fn default() -> Self {
        Self {
            pools: DEFAULT_POOLS.to_vec(),
            period: DEFAULT_REPLENISH_PERIOD,
        }
    }
}

impl PagePoolConfig {
    /// An empty topology; add pools with [`with_pool`](Self::with_pool).
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self {
            pools: Vec::new(),
            period,
        }
    }

    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pools.push(pool);
        self
    }

    /// Check the topology before any memory is touched.
    ///
    /// # Errors
    /// The first problem found, see [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pools.is_empty() {
            return Err(ConfigError::NoPools);
        }
        if self.period.is_zero() {
            return Err(ConfigError::ZeroPeriod);
        }

        let mut seen = [false; ORDER_COUNT];
        for pool in &self.pools {
            if !is_pool_order(pool.order) {
                return Err(ConfigError::OrderOutOfRange {
                    order: pool.order,
                    min: MIN_POOL_ORDER,
                    max: MAX_POOL_ORDER,
                });
            }
            if pool.capacity == 0 {
                return Err(ConfigError::ZeroCapacity { order: pool.order });
            }
            let slot = &mut seen[pool.order as usize];
            if *slot {
                return Err(ConfigError::DuplicateOrder { order: pool.order });
            }
            *slot = true;
        }
        Ok(())
    }
}
