//! The boundary to the general-purpose page allocator.

use crate::block::BlockHandle;
use crate::config::{MAX_ORDER, ORDER_COUNT, PAGE_SIZE};
use alloc::vec::Vec;
use kernel_sync::SpinLock;

/// Upstream allocator the pools draw from and report against.
///
/// `free_pages_at_order` must not block. `acquire_block` and `release_block`
/// may block and are only called from the replenisher or during activation
/// and teardown, never from the allocation fast path.
pub trait PageSource: Sync {
    /// System-wide number of free blocks of exactly `order`.
    fn free_pages_at_order(&self, order: u32) -> u64;

    /// Take one block of `2^order` pages, if the source can spare it.
    fn acquire_block(&self, order: u32) -> Option<BlockHandle>;

    /// Give a block back.
    fn release_block(&self, block: BlockHandle);

    /// Free counts for every order, lowest first.
    #[allow(clippy::cast_possible_truncation)]
    fn free_histogram(&self) -> [u64; ORDER_COUNT] {
        core::array::from_fn(|order| self.free_pages_at_order(order as u32))
    }
}

/// A page source backed by one physical region and per-order free lists.
///
/// Blocks are carved from the region on [`seed`](Self::seed) and never split
/// or merged afterwards, so the per-order counts are exactly what was seeded
/// minus what is currently handed out. Good enough for early boot and for
/// driving the pools on a host.
pub struct SegregatedPageSource {
    inner: SpinLock<Carved>,
}

struct Carved {
    /// Next unused physical address in the region.
    next: u64,
    end: u64,
    free: [Vec<u64>; ORDER_COUNT],
}

impl SegregatedPageSource {
    /// Manage `[base, base + pages * PAGE_SIZE)`. Nothing is free until seeded.
    #[must_use]
    pub fn new(base: u64, pages: u64) -> Self {
        Self {
            inner: SpinLock::new(Carved {
                next: base,
                end: base.saturating_add(pages.saturating_mul(PAGE_SIZE)),
                free: core::array::from_fn(|_| Vec::new()),
            }),
        }
    }

    /// Carve up to `count` blocks of `order` from the unused part of the region
    /// and put them on that order's free list. Returns how many were carved.
    pub fn seed(&self, order: u32, count: usize) -> usize {
        if order >= MAX_ORDER {
            return 0;
        }
        let size = PAGE_SIZE << order;
        self.inner.with_lock(|c| {
            let mut carved = 0;
            while carved < count {
                let base = c.next.next_multiple_of(size);
                let Some(end) = base.checked_add(size) else {
                    break;
                };
                if end > c.end {
                    break;
                }
                c.free[order as usize].push(base);
                c.next = end;
                carved += 1;
            }
            carved
        })
    }

    /// Take every free block of `order` out of circulation, pretending the
    /// rest of the system consumed them. Returns the withheld blocks.
    pub fn withhold(&self, order: u32) -> Vec<BlockHandle> {
        if order >= MAX_ORDER {
            return Vec::new();
        }
        self.inner.with_lock(|c| {
            c.free[order as usize]
                .drain(..)
                .map(|base| BlockHandle::new(base, order))
                .collect()
        })
    }

    /// Bytes of the region not yet carved into blocks.
    #[must_use]
    pub fn uncarved_bytes(&self) -> u64 {
        self.inner.with_lock(|c| c.end.saturating_sub(c.next))
    }
}

impl PageSource for SegregatedPageSource {
    fn free_pages_at_order(&self, order: u32) -> u64 {
        if order >= MAX_ORDER {
            return 0;
        }
        self.inner.with_lock(|c| c.free[order as usize].len() as u64)
    }

    fn acquire_block(&self, order: u32) -> Option<BlockHandle> {
        if order >= MAX_ORDER {
            return None;
        }
        let base = self.inner.with_lock(|c| c.free[order as usize].pop())?;
        Some(BlockHandle::new(base, order))
    }

    fn release_block(&self, block: BlockHandle) {
        let order = block.order();
        debug_assert!(order < MAX_ORDER);
        self.inner
            .with_lock(|c| c.free[order as usize].push(block.base()));
    }

    fn free_histogram(&self) -> [u64; ORDER_COUNT] {
        self.inner
            .with_lock(|c| core::array::from_fn(|order| c.free[order].len() as u64))
    }
}
