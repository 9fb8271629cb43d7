//! The shared pool context and the allocation fast path.

use crate::block::{AllocClass, BlockHandle, Caller, Zone};
use crate::config::{ORDER_COUNT, PagePoolConfig, is_pool_order};
use crate::error::InitError;
use crate::pool::{Pool, Take};
use crate::source::PageSource;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use kernel_sync::{SpinLock, WaitEvent};
use log::{info, warn};

/// Allocation activity since the replenisher last found nothing to do.
///
/// Guarded by its own lock, never taken while a pool lock is held.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct GlobalStats {
    /// Successful fast-path allocations since the last idle pass.
    pub alloc_count: u64,
    /// Some pool may be below capacity.
    pub dirty: bool,
}

/// The page-pool context: pool table, global counters, kill switch, and the
/// page source they draw from.
///
/// Construct once, wrap in an `Arc`, and share it with every caller and the
/// [`ReplenishDaemon`](crate::ReplenishDaemon).
pub struct PoolAllocator<S> {
    /// Sorted by ascending order.
    pools: Vec<Pool>,
    /// Index into `pools` per order.
    by_order: [Option<usize>; ORDER_COUNT],
    pub(crate) global: SpinLock<GlobalStats>,
    enabled: AtomicBool,
    pub(crate) wake: WaitEvent,
    period: Duration,
    source: S,
}

impl<S: PageSource> PoolAllocator<S> {
    /// Validate `config`, reserve all slot storage, and pre-fill every pool
    /// from `source`.
    ///
    /// A pool the source cannot fill completely starts degraded; the
    /// replenisher finishes the job.
    ///
    /// # Errors
    /// The configuration is invalid, or slot storage could not be reserved.
    pub fn new(config: &PagePoolConfig, source: S) -> Result<Self, InitError> {
        config.validate()?;

        let mut topology = config.pools.clone();
        topology.sort_unstable_by_key(|p| p.order);

        let mut pools = Vec::new();
        pools
            .try_reserve_exact(topology.len())
            .map_err(|_| InitError::SlotStorage {
                order: topology[0].order,
            })?;
        let mut by_order = [None; ORDER_COUNT];
        for (idx, cfg) in topology.iter().enumerate() {
            pools.push(Pool::new(cfg)?);
            by_order[cfg.order as usize] = Some(idx);
        }

        let mut degraded = false;
        for pool in pools.iter_mut().rev() {
            degraded |= !prefill(pool, &source);
        }

        info!(
            "page pools active: {} pools, replenish period {:?}",
            pools.len(),
            config.period
        );

        Ok(Self {
            pools,
            by_order,
            global: SpinLock::new(GlobalStats {
                alloc_count: 0,
                dirty: degraded,
            }),
            enabled: AtomicBool::new(true),
            wake: WaitEvent::new(),
            period: config.period,
            source,
        })
    }

    /// Serve one block of `order` to a normal caller, or decline.
    ///
    /// Only `(AllocClass::Standard, Zone::Normal)` requests for a configured
    /// order are served, and only while the allocator is enabled. Never
    /// sleeps and never allocates.
    #[inline]
    pub fn try_alloc(&self, order: u32, class: AllocClass, zone: Zone) -> Option<BlockHandle> {
        self.try_alloc_as(order, class, zone, Caller::Normal)
    }

    /// [`try_alloc`](Self::try_alloc) with an explicit caller identity.
    pub fn try_alloc_as(
        &self,
        order: u32,
        class: AllocClass,
        zone: Zone,
        caller: Caller,
    ) -> Option<BlockHandle> {
        if !is_pool_order(order)
            || class != AllocClass::Standard
            || zone != Zone::Normal
            || !self.enabled.load(Ordering::Acquire)
        {
            return None;
        }
        let pool = self.pool(order)?;

        // The pool lock is released when `take` returns.
        match pool.take(caller) {
            Take::Block { block, emptied } => {
                self.global.with_lock(|g| {
                    g.alloc_count += 1;
                    g.dirty = true;
                });
                if emptied {
                    self.wake.signal();
                }
                Some(block)
            }
            Take::Empty => {
                self.wake.signal();
                None
            }
        }
    }

    /// The pool serving `order`, if one is configured.
    #[must_use]
    pub fn pool(&self, order: u32) -> Option<&Pool> {
        let idx = (*self.by_order.get(order as usize)?)?;
        self.pools.get(idx)
    }

    /// All pools, lowest order first.
    #[must_use]
    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    #[must_use]
    pub fn global_stats(&self) -> GlobalStats {
        self.global.with_lock(|g| *g)
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Wake the replenisher now instead of at the end of its period.
    pub fn kick(&self) {
        self.wake.signal();
    }

    pub(crate) fn load_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(crate) fn store_enabled(&self, on: bool) -> bool {
        self.enabled.swap(on, Ordering::AcqRel)
    }

    /// Hand every pooled block back to the page source. Returns how many.
    ///
    /// Meant for teardown: disable the allocator and stop the replenisher
    /// first, or the pools fill right back up.
    pub fn release_all(&self) -> usize {
        let mut released = 0;
        for pool in &self.pools {
            // One block per lock hold; the source is never called under a pool lock.
            while let Some(block) = pool.evict() {
                self.source.release_block(block);
                released += 1;
            }
        }
        if released > 0 {
            self.global.with_lock(|g| g.dirty = true);
        }
        released
    }
}

/// Fill `pool` to capacity. Returns `false` if the source ran dry first.
fn prefill<S: PageSource>(pool: &mut Pool, source: &S) -> bool {
    let order = pool.order();
    for stocked in 0..pool.capacity() {
        let Some(block) = source.acquire_block(order) else {
            warn!(
                "order-{order} pool pre-filled to {stocked}/{} only",
                pool.capacity()
            );
            return false;
        };
        debug_assert_eq!(block.order(), order);
        if let Err(block) = pool.stock(block) {
            source.release_block(block);
            break;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_ORDER, PoolConfig};
    use crate::source::SegregatedPageSource;

    fn config() -> PagePoolConfig {
        PagePoolConfig::new(Duration::from_millis(5))
            .with_pool(PoolConfig::new(3, 1, 4))
            .with_pool(PoolConfig::new(2, 2, 10))
    }

    fn source(blocks_per_order: usize) -> SegregatedPageSource {
        let src = SegregatedPageSource::new(0, 1 << 16);
        src.seed(2, blocks_per_order);
        src.seed(3, blocks_per_order);
        src
    }

    #[test]
    fn pools_are_sorted_and_prefilled() {
        let a = PoolAllocator::new(&config(), source(20)).unwrap();
        let orders: Vec<u32> = a.pools().iter().map(Pool::order).collect();
        assert_eq!(orders, [2, 3]);
        assert_eq!(a.pool(2).unwrap().stats().free, 10);
        assert_eq!(a.pool(3).unwrap().stats().free, 4);
        assert_eq!(a.source().free_pages_at_order(2), 10);
        assert_eq!(a.global_stats(), GlobalStats::default());
    }

    #[test]
    fn short_source_starts_degraded_and_dirty() {
        let a = PoolAllocator::new(&config(), source(3)).unwrap();
        let s = a.pool(2).unwrap().stats();
        assert_eq!((s.free, s.used), (3, 7));
        assert!(a.global_stats().dirty);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = PoolAllocator::new(&PagePoolConfig::new(Duration::from_secs(1)), source(1))
            .err()
            .unwrap();
        assert!(matches!(err, InitError::Config(_)));
    }

    #[test]
    fn declines_unserved_requests() {
        let a = PoolAllocator::new(&config(), source(20)).unwrap();
        assert!(a.try_alloc(0, AllocClass::Standard, Zone::Normal).is_none());
        assert!(a.try_alloc(MAX_ORDER, AllocClass::Standard, Zone::Normal).is_none());
        assert!(a.try_alloc(1, AllocClass::Standard, Zone::Normal).is_none());
        assert!(a.try_alloc(2, AllocClass::Movable, Zone::Normal).is_none());
        assert!(a.try_alloc(2, AllocClass::Standard, Zone::Dma32).is_none());
        assert_eq!(a.pool(2).unwrap().stats().free, 10);
        assert_eq!(a.global_stats().alloc_count, 0);
    }

    #[test]
    fn successful_alloc_marks_dirty_and_emptying_wakes() {
        let a = PoolAllocator::new(&config(), source(20)).unwrap();
        let b = a.try_alloc(3, AllocClass::Standard, Zone::Normal).unwrap();
        assert_eq!(b.order(), 3);
        assert_eq!(
            a.global_stats(),
            GlobalStats {
                alloc_count: 1,
                dirty: true
            }
        );
        assert!(!a.wake.is_pending());

        for _ in 0..3 {
            a.try_alloc(3, AllocClass::Standard, Zone::Normal).unwrap();
        }
        assert!(a.wake.take());
        assert!(a.try_alloc(3, AllocClass::Standard, Zone::Normal).is_none());
        assert!(a.wake.is_pending());
    }

    #[test]
    fn release_all_returns_blocks_upstream() {
        let a = PoolAllocator::new(&config(), source(20)).unwrap();
        assert_eq!(a.release_all(), 14);
        assert_eq!(a.source().free_pages_at_order(2), 20);
        assert_eq!(a.source().free_pages_at_order(3), 20);
        assert!(a.pools().iter().all(|p| p.stats().free == 0));
    }
}
