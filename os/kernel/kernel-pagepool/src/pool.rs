//! One fixed-capacity cache of blocks of a single order.
//!
//! # Slot layout
//!
//! ```text
//!  slots:    [ B0 | -- | B2 | -- | B4 ]      capacity = 5
//!  occupied: [0, 2, 4]                      indices holding a block
//!  vacant:   [3, 1]                         indices holding nothing
//! ```
//!
//! `occupied` and `vacant` partition `0..capacity`. Both are reserved to
//! `capacity` up front, so popping and pushing never allocate.

use crate::block::{BlockHandle, Caller};
use crate::config::PoolConfig;
use crate::error::InitError;
use alloc::vec::Vec;
use kernel_sync::SpinLock;

/// Per-pool counters.
///
/// `free + used == capacity` holds whenever the pool lock is not held.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct UsageStats {
    /// Slots holding a block.
    pub free: usize,
    /// Slots waiting to be refilled.
    pub used: usize,
    /// Highest `used` seen by a normal caller's allocation.
    pub peak: usize,
    /// Blocks handed to normal callers since activation.
    pub total_lifetime: u64,
    /// Blocks stored by the replenisher since activation.
    pub refilled: u64,
    /// Requests declined because the pool was empty.
    pub empty_declines: u64,
}

/// Result of taking a block from a pool.
#[derive(Debug)]
pub(crate) enum Take {
    Block {
        block: BlockHandle,
        /// This pop took the last block.
        emptied: bool,
    },
    Empty,
}

struct Slots {
    slots: Vec<Option<BlockHandle>>,
    occupied: Vec<usize>,
    vacant: Vec<usize>,
    stats: UsageStats,
}

impl Slots {
    fn with_capacity(order: u32, capacity: usize) -> Result<Self, InitError> {
        let storage = InitError::SlotStorage { order };
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|_| storage)?;
        let mut occupied = Vec::new();
        occupied.try_reserve_exact(capacity).map_err(|_| storage)?;
        let mut vacant = Vec::new();
        vacant.try_reserve_exact(capacity).map_err(|_| storage)?;

        slots.resize_with(capacity, || None);
        // Reversed so the lowest index is refilled first.
        vacant.extend((0..capacity).rev());

        Ok(Self {
            slots,
            occupied,
            vacant,
            stats: UsageStats {
                used: capacity,
                ..UsageStats::default()
            },
        })
    }

    fn take(&mut self, caller: Caller) -> Take {
        let Some(idx) = self.occupied.pop() else {
            self.stats.empty_declines += 1;
            return Take::Empty;
        };
        let Some(block) = self.slots[idx].take() else {
            unreachable!("occupied index {idx} points at an empty slot");
        };
        self.vacant.push(idx);

        let s = &mut self.stats;
        s.free -= 1;
        s.used += 1;
        if caller.counts_in_stats() {
            s.peak = s.peak.max(s.used);
            s.total_lifetime += 1;
        }
        Take::Block {
            block,
            emptied: s.free == 0,
        }
    }

    fn put(&mut self, block: BlockHandle) -> Result<(), BlockHandle> {
        let Some(idx) = self.vacant.pop() else {
            return Err(block);
        };
        debug_assert!(self.slots[idx].is_none());
        self.slots[idx] = Some(block);
        self.occupied.push(idx);
        self.stats.free += 1;
        self.stats.used -= 1;
        Ok(())
    }

    fn evict(&mut self) -> Option<BlockHandle> {
        let idx = self.occupied.pop()?;
        let block = self.slots[idx].take();
        self.vacant.push(idx);
        self.stats.free -= 1;
        self.stats.used += 1;
        block
    }
}

/// A cache of blocks of one order, guarded by its own lock.
pub struct Pool {
    order: u32,
    threshold: u64,
    capacity: usize,
    slots: SpinLock<Slots>,
}

impl Pool {
    /// Create an empty pool. Fails only if slot storage cannot be reserved.
    pub(crate) fn new(config: &PoolConfig) -> Result<Self, InitError> {
        Ok(Self {
            order: config.order,
            threshold: config.threshold,
            capacity: config.capacity,
            slots: SpinLock::new(Slots::with_capacity(config.order, config.capacity)?),
        })
    }

    #[inline]
    #[must_use]
    pub const fn order(&self) -> u32 {
        self.order
    }

    #[inline]
    #[must_use]
    pub const fn threshold(&self) -> u64 {
        self.threshold
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> UsageStats {
        self.slots.with_lock(|s| s.stats)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.with_lock(|s| s.vacant.is_empty())
    }

    /// How often the pool lock had to be waited for.
    #[must_use]
    pub fn lock_contention(&self) -> u64 {
        self.slots.contention_count()
    }

    /// Fast path pop. Never allocates; holds the lock only for the pop itself.
    pub(crate) fn take(&self, caller: Caller) -> Take {
        self.slots.with_lock(|s| s.take(caller))
    }

    /// Store a block from the replenisher. Hands it back if no slot is vacant.
    pub(crate) fn refill(&self, block: BlockHandle) -> Result<(), BlockHandle> {
        self.slots.with_lock(|s| {
            s.put(block)?;
            s.stats.refilled += 1;
            Ok(())
        })
    }

    /// Store a block during activation, before the pool is shared.
    pub(crate) fn stock(&mut self, block: BlockHandle) -> Result<(), BlockHandle> {
        self.slots.get_mut().put(block)
    }

    /// Remove one block without touching the caller statistics.
    pub(crate) fn evict(&self) -> Option<BlockHandle> {
        self.slots.with_lock(Slots::evict)
    }
}

impl core::fmt::Debug for Pool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pool")
            .field("order", &self.order)
            .field("threshold", &self.threshold)
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
