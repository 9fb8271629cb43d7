use crate::config::PAGE_SIZE;

/// Exclusive ownership of one physically contiguous block of `2^order` pages.
///
/// Neither `Clone` nor `Copy`: whoever holds the handle owns the
/// block, be it a pool slot, a caller, or the page source.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    base: u64,
    order: u32,
}

impl BlockHandle {
    /// Wrap a block handed out by a page source.
    ///
    /// `base` is the physical address of the first page and should be aligned
    /// to the block size.
    #[must_use]
    pub const fn new(base: u64, order: u32) -> Self {
        debug_assert!(base.is_multiple_of(PAGE_SIZE << order), "unaligned block");
        Self { base, order }
    }

    /// Physical base address.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> u64 {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn order(&self) -> u32 {
        self.order
    }

    /// Number of base pages in the block.
    #[inline]
    #[must_use]
    pub const fn pages(&self) -> u64 {
        1 << self.order
    }

    #[inline]
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        PAGE_SIZE << self.order
    }
}

/// Allocation class requested by the caller. Only `Standard` is served.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AllocClass {
    Standard,
    /// Movable allocations belong to the upstream allocator.
    Movable,
    /// Reclaimable allocations belong to the upstream allocator.
    Reclaimable,
    /// Atomic/high-priority reserve allocations belong to the upstream allocator.
    HighAtomic,
}

/// Memory zone requested by the caller. Only `Normal` is served.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Zone {
    Dma,
    Dma32,
    Normal,
    Movable,
}

/// Who is allocating.
///
/// Allocations made on behalf of the replenisher itself (for example when an
/// upstream allocator routes the replenisher's own requests through this
/// cache) must not inflate `peak` or `total_lifetime`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum Caller {
    #[default]
    Normal,
    Replenisher,
}

impl Caller {
    #[inline]
    #[must_use]
    pub const fn counts_in_stats(self) -> bool {
        matches!(self, Self::Normal)
    }
}
