//! Kill switch and status dump.
//!
//! Transport-agnostic: whatever exposes the control file (sysfs-like node,
//! debug shell, ...) forwards reads to [`PoolAllocator::dump_status`] and
//! writes to [`PoolAllocator::write_control`].

use crate::allocator::PoolAllocator;
use crate::config::ORDER_COUNT;
use crate::source::PageSource;
use alloc::vec::Vec;
use core::fmt;
use log::info;

/// One pool's line in the status dump.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    pub order: u32,
    pub capacity: usize,
    pub threshold: u64,
    pub free: usize,
    pub used: usize,
    /// What the page source reports free at this order.
    pub system_free_at_order: u64,
    pub peak: usize,
    pub total_lifetime: u64,
    pub refilled: u64,
    pub empty_declines: u64,
    pub lock_contention: u64,
}

/// Read-only snapshot of the whole subsystem.
///
/// Each pool is sampled under its own lock, one after the other, so the
/// snapshot is consistent per pool but not across pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub enabled: bool,
    pub alloc_count: u64,
    pub dirty: bool,
    /// Lowest order first.
    pub pools: Vec<PoolStatus>,
    /// Page-source free counts for every order.
    pub system_free: [u64; ORDER_COUNT],
}

impl StatusReport {
    #[must_use]
    pub fn pool(&self, order: u32) -> Option<&PoolStatus> {
        self.pools.iter().find(|p| p.order == order)
    }
}

impl<S: PageSource> PoolAllocator<S> {
    #[must_use]
    pub fn get_enabled(&self) -> bool {
        self.load_enabled()
    }

    /// Turn the fast path on or off. Pool contents are left alone.
    pub fn set_enabled(&self, on: bool) {
        if self.store_enabled(on) != on {
            info!("page pools {}", if on { "enabled" } else { "disabled" });
        }
    }

    /// Snapshot every pool and the page source's free histogram.
    ///
    /// Never allocates from the pools or the source.
    #[must_use]
    pub fn dump_status(&self) -> StatusReport {
        let system_free = self.source().free_histogram();
        let pools = self
            .pools()
            .iter()
            .map(|pool| {
                let s = pool.stats();
                PoolStatus {
                    order: pool.order(),
                    capacity: pool.capacity(),
                    threshold: pool.threshold(),
                    free: s.free,
                    used: s.used,
                    system_free_at_order: system_free[pool.order() as usize],
                    peak: s.peak,
                    total_lifetime: s.total_lifetime,
                    refilled: s.refilled,
                    empty_declines: s.empty_declines,
                    lock_contention: pool.lock_contention(),
                }
            })
            .collect();
        let global = self.global_stats();

        StatusReport {
            enabled: self.get_enabled(),
            alloc_count: global.alloc_count,
            dirty: global.dirty,
            pools,
            system_free,
        }
    }

    /// Control-file write: `'0'` disables, `'1'` enables, anything else is
    /// ignored. The whole input is always reported as consumed.
    pub fn write_control(&self, input: &[u8]) -> usize {
        match input.first() {
            Some(b'0') => self.set_enabled(false),
            Some(b'1') => self.set_enabled(true),
            _ => {}
        }
        input.len()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "enabled: {}", u8::from(self.enabled))?;
        writeln!(
            f,
            "alloc_count: {} dirty: {}",
            self.alloc_count,
            u8::from(self.dirty)
        )?;
        writeln!(
            f,
            "{:>5} {:>6} {:>6} {:>9} {:>6} {:>10} {:>9} {:>9} {:>9}",
            "order", "free", "used", "sys_free", "peak", "total", "refilled", "declined", "contended"
        )?;
        for p in &self.pools {
            writeln!(
                f,
                "{:>5} {:>6} {:>6} {:>9} {:>6} {:>10} {:>9} {:>9} {:>9}",
                p.order,
                p.free,
                p.used,
                p.system_free_at_order,
                p.peak,
                p.total_lifetime,
                p.refilled,
                p.empty_declines,
                p.lock_contention
            )?;
        }
        write!(f, "system free:")?;
        for (order, count) in self.system_free.iter().enumerate() {
            write!(f, " {order}:{count}")?;
        }
        writeln!(f)
    }
}
