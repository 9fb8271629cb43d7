//! Background replenishment.
//!
//! One dedicated worker owns a [`ReplenishDaemon`] and calls
//! [`run`](ReplenishDaemon::run). It wakes when its period elapses or when the
//! fast path reports an empty pool, and tops up under-filled pools from the
//! page source, highest order first. A shortage at the source is retried one
//! period later; early wakes are ignored until then.

use crate::allocator::PoolAllocator;
use crate::pool::Pool;
use crate::source::PageSource;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use core::time::Duration;
use kernel_sync::{Clock, WakeReason};
use log::{debug, info, trace};

/// What one pass did to one pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RefillOutcome {
    /// Already at capacity; skipped.
    Full,
    /// Topped up to capacity.
    Refilled { added: usize },
    /// Stopped because the source reported fewer free blocks than the
    /// pool's threshold.
    BelowThreshold { added: usize, system_free: u64 },
    /// Stopped because the source refused a block.
    SourceExhausted { added: usize },
}

impl RefillOutcome {
    #[must_use]
    pub const fn added(self) -> usize {
        match self {
            Self::Full => 0,
            Self::Refilled { added }
            | Self::BelowThreshold { added, .. }
            | Self::SourceExhausted { added } => added,
        }
    }

    /// The pool was below capacity when the pass reached it.
    #[must_use]
    pub const fn needed_work(self) -> bool {
        !matches!(self, Self::Full)
    }

    /// The source could not cover the pool; retry after a full period.
    #[must_use]
    pub const fn is_short(self) -> bool {
        matches!(
            self,
            Self::BelowThreshold { .. } | Self::SourceExhausted { .. }
        )
    }
}

/// Result of [`ReplenishDaemon::run_pass`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassReport {
    /// Nothing was marked dirty; no pool was looked at.
    Idle,
    /// Pools were scanned, highest order first.
    Scanned {
        /// `(order, outcome)` in scan order.
        pools: Vec<(u32, RefillOutcome)>,
    },
}

impl PassReport {
    #[must_use]
    pub fn blocks_added(&self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Scanned { pools } => pools.iter().map(|(_, o)| o.added()).sum(),
        }
    }

    /// Some pool was below capacity, so the next pass will look again.
    #[must_use]
    pub fn needed_work(&self) -> bool {
        match self {
            Self::Idle => false,
            Self::Scanned { pools } => pools.iter().any(|(_, o)| o.needed_work()),
        }
    }

    /// Some pool was left short by the source.
    #[must_use]
    pub fn ended_short(&self) -> bool {
        match self {
            Self::Idle => false,
            Self::Scanned { pools } => pools.iter().any(|(_, o)| o.is_short()),
        }
    }

    #[must_use]
    pub fn outcome(&self, order: u32) -> Option<RefillOutcome> {
        match self {
            Self::Idle => None,
            Self::Scanned { pools } => pools.iter().find(|(o, _)| *o == order).map(|(_, r)| *r),
        }
    }
}

/// The single background worker that keeps the pools stocked.
pub struct ReplenishDaemon<S> {
    allocator: Arc<PoolAllocator<S>>,
    stop: AtomicBool,
    passes: AtomicU64,
}

impl<S: PageSource> ReplenishDaemon<S> {
    #[must_use]
    pub const fn new(allocator: Arc<PoolAllocator<S>>) -> Self {
        Self {
            allocator,
            stop: AtomicBool::new(false),
            passes: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn allocator(&self) -> &Arc<PoolAllocator<S>> {
        &self.allocator
    }

    /// Passes that scanned pools, i.e. excluding idle wakes.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Serve forever, or until [`request_stop`](Self::request_stop).
    ///
    /// After a pass the source left short, the next pass runs one full
    /// period later no matter how often the fast path signals meanwhile.
    pub fn run<C: Clock + ?Sized>(&self, clock: &C) {
        let period = self.allocator.period();
        info!("replenish daemon running, period {period:?}");

        let mut backoff = false;
        while !self.stop.load(Ordering::Acquire) {
            if backoff {
                self.sleep(clock, period);
                // Wakes raised during the backoff are covered by this pass.
                self.allocator.wake.take();
            } else if self.allocator.wake.wait_timeout(clock, period) == WakeReason::Signalled {
                trace!("replenish daemon woken early");
            }
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            let report = self.run_pass();
            backoff = report.ended_short();
            if backoff {
                trace!("source short, next pass in {period:?}");
            }
        }

        info!("replenish daemon stopped after {} passes", self.passes());
    }

    /// Wait out `period` ignoring wake signals, but not a stop request.
    fn sleep<C: Clock + ?Sized>(&self, clock: &C, period: Duration) {
        let deadline = clock.now().saturating_add(period);
        while clock.now() < deadline && !self.stop.load(Ordering::Acquire) {
            clock.relax();
        }
    }

    /// Make [`run`](Self::run) return at its next wake. Teardown only.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.allocator.wake.signal();
    }

    /// One replenishment pass.
    ///
    /// Does nothing unless some allocation marked the pools dirty. Otherwise
    /// clears the mark, scans the pools from the highest order down, and sets
    /// the mark again if any pool was below capacity. A pass that finds every
    /// pool full resets the allocation counter.
    pub fn run_pass(&self) -> PassReport {
        let a = &*self.allocator;

        let was_dirty = a.global.with_lock(|g| core::mem::replace(&mut g.dirty, false));
        if !was_dirty {
            return PassReport::Idle;
        }
        self.passes.fetch_add(1, Ordering::Relaxed);

        let pools: Vec<_> = a
            .pools()
            .iter()
            .rev()
            .map(|pool| (pool.order(), refill_pool(pool, a.source())))
            .collect();
        let report = PassReport::Scanned { pools };

        if report.needed_work() {
            a.global.with_lock(|g| g.dirty = true);
        } else {
            a.global.with_lock(|g| g.alloc_count = 0);
        }

        if let PassReport::Scanned { pools } = &report {
            for &(order, outcome) in pools.iter().filter(|(_, o)| o.needed_work()) {
                debug!("order-{order} pool: {outcome:?}");
            }
        }
        report
    }
}

/// Refill one pool slot by slot, releasing the pool lock around every call
/// into the source.
fn refill_pool<S: PageSource>(pool: &Pool, source: &S) -> RefillOutcome {
    if pool.is_full() {
        return RefillOutcome::Full;
    }

    let order = pool.order();
    let mut added = 0;
    // Bounded so concurrent draining cannot keep one pass going forever.
    for _ in 0..pool.capacity() {
        if pool.is_full() {
            break;
        }
        let system_free = source.free_pages_at_order(order);
        if system_free < pool.threshold() {
            return RefillOutcome::BelowThreshold { added, system_free };
        }
        let Some(block) = source.acquire_block(order) else {
            return RefillOutcome::SourceExhausted { added };
        };
        if let Err(block) = pool.refill(block) {
            source.release_block(block);
            break;
        }
        added += 1;
    }
    RefillOutcome::Refilled { added }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{AllocClass, Zone};
    use crate::config::{PagePoolConfig, PoolConfig};
    use crate::source::SegregatedPageSource;

    fn daemon(seed: usize) -> ReplenishDaemon<SegregatedPageSource> {
        let src = SegregatedPageSource::new(0, 1 << 16);
        src.seed(1, seed);
        src.seed(2, seed);
        let cfg = PagePoolConfig::new(Duration::from_millis(5))
            .with_pool(PoolConfig::new(1, 2, 4))
            .with_pool(PoolConfig::new(2, 2, 4));
        ReplenishDaemon::new(Arc::new(PoolAllocator::new(&cfg, src).unwrap()))
    }

    fn drain(d: &ReplenishDaemon<SegregatedPageSource>, order: u32, n: usize) {
        for _ in 0..n {
            let b = d
                .allocator()
                .try_alloc(order, AllocClass::Standard, Zone::Normal)
                .unwrap();
            // Callers own popped blocks; drop them on the floor here.
            drop(b);
        }
    }

    #[test]
    fn clean_pools_make_an_idle_pass() {
        let d = daemon(16);
        assert_eq!(d.run_pass(), PassReport::Idle);
        assert_eq!(d.passes(), 0);
    }

    #[test]
    fn scans_highest_order_first() {
        let d = daemon(16);
        drain(&d, 1, 1);
        let PassReport::Scanned { pools } = d.run_pass() else {
            panic!("pools were dirty");
        };
        let orders: Vec<u32> = pools.iter().map(|(o, _)| *o).collect();
        assert_eq!(orders, [2, 1]);
        assert_eq!(pools[0].1, RefillOutcome::Full);
        assert_eq!(pools[1].1, RefillOutcome::Refilled { added: 1 });
    }

    #[test]
    fn work_keeps_dirty_set_until_a_clean_pass() {
        let d = daemon(16);
        drain(&d, 2, 3);

        let first = d.run_pass();
        assert_eq!(first.blocks_added(), 3);
        assert!(first.needed_work());
        let g = d.allocator().global_stats();
        assert!(g.dirty);
        assert_eq!(g.alloc_count, 3);

        let second = d.run_pass();
        assert!(!second.needed_work());
        assert_eq!(second.blocks_added(), 0);
        assert_eq!(
            d.allocator().global_stats(),
            crate::GlobalStats {
                alloc_count: 0,
                dirty: false
            }
        );
        assert_eq!(d.run_pass(), PassReport::Idle);
        assert_eq!(d.passes(), 2);
    }

    #[test]
    fn threshold_stops_refill_without_consuming() {
        // Pool capacity 4 takes 4 of 5 seeded order-1 blocks, leaving 1 < threshold 2.
        let d = daemon(5);
        drain(&d, 1, 2);
        let report = d.run_pass();
        assert_eq!(
            report.outcome(1),
            Some(RefillOutcome::BelowThreshold {
                added: 0,
                system_free: 1
            })
        );
        assert_eq!(d.allocator().source().free_pages_at_order(1), 1);
        assert!(d.allocator().global_stats().dirty);
        assert!(report.ended_short());
        assert!(report.needed_work());
    }

    #[test]
    fn refilled_pass_is_not_short() {
        let d = daemon(16);
        drain(&d, 2, 2);
        let report = d.run_pass();
        assert!(report.needed_work());
        assert!(!report.ended_short());
        assert!(!RefillOutcome::Full.is_short());
        assert!(RefillOutcome::SourceExhausted { added: 0 }.is_short());
    }

    #[test]
    fn stop_request_ends_run() {
        struct Frozen;
        impl Clock for Frozen {
            fn now(&self) -> Duration {
                Duration::ZERO
            }
        }

        let d = daemon(16);
        d.request_stop();
        // Returns at once: the stop flag is checked before waiting.
        d.run(&Frozen);
        assert_eq!(d.passes(), 0);
    }
}
