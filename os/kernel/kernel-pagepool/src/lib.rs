//! # Page Pool Cache
//!
//! A fixed-size, multi-order cache of physically contiguous blocks that sits
//! in front of the general-purpose page allocator. Latency-sensitive callers
//! get a block of a common size with one short lock hold; a background worker
//! refills the pools so depletion heals itself.
//!
//! ## Architecture
//!
//! ```text
//!  callers ──try_alloc──▶ ┌──────────────────────────────┐
//!                         │        PoolAllocator         │
//!  control ──dump/write─▶ │  enabled   GlobalStats(lock) │
//!                         │  ┌────────┐┌────────┐        │
//!                         │  │ order 1││ order 2│ ...    │ one lock per pool
//!                         │  └────────┘└────────┘        │
//!                         └──────────────▲───────────────┘
//!                                        │ refill, highest order first
//!                               ┌────────┴────────┐
//!                               │ ReplenishDaemon │◀── WaitEvent (period | kick)
//!                               └────────┬────────┘
//!                                        │ acquire_block / free_pages_at_order
//!                               ┌────────▼────────┐
//!                               │   PageSource    │
//!                               └─────────────────┘
//! ```
//!
//! ## Locking
//!
//! * Every [`Pool`] has its own [`SpinLock`](kernel_sync::SpinLock).
//! * [`GlobalStats`] has a separate lock.
//! * Nobody holds two pool locks, or a pool lock and the global lock, at the
//!   same time. New locks must keep it that way.
//! * The page source is never called with a pool lock held.
//!
//! ## Fast path
//!
//! [`PoolAllocator::try_alloc`] declines (returns `None`) unless the request
//! is `(AllocClass::Standard, Zone::Normal)` for a configured order in
//! `1..MAX_ORDER` and the allocator is enabled. It never sleeps, never
//! allocates, and never logs.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use kernel_pagepool::{
//!     AllocClass, PagePoolConfig, PoolAllocator, PoolConfig, ReplenishDaemon,
//!     SegregatedPageSource, Zone,
//! };
//! use core::time::Duration;
//!
//! let source = SegregatedPageSource::new(0x10_0000, 4096);
//! source.seed(2, 32);
//!
//! let config = PagePoolConfig::new(Duration::from_secs(1))
//!     .with_pool(PoolConfig::new(2, 2, 10));
//! let pools = Arc::new(PoolAllocator::new(&config, source).unwrap());
//!
//! let block = pools.try_alloc(2, AllocClass::Standard, Zone::Normal).unwrap();
//! assert_eq!(block.pages(), 4);
//!
//! // Normally run on its own worker via `daemon.run(&clock)`.
//! let daemon = ReplenishDaemon::new(Arc::clone(&pools));
//! assert_eq!(daemon.run_pass().blocks_added(), 1);
//! assert_eq!(pools.pool(2).unwrap().stats().free, 10);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod allocator;
mod block;
pub mod config;
mod control;
mod daemon;
mod error;
mod pool;
mod source;

pub use allocator::{GlobalStats, PoolAllocator};
pub use block::{AllocClass, BlockHandle, Caller, Zone};
pub use config::{MAX_ORDER, PAGE_SIZE, PagePoolConfig, PoolConfig};
pub use control::{PoolStatus, StatusReport};
pub use daemon::{PassReport, RefillOutcome, ReplenishDaemon};
pub use error::{ConfigError, InitError};
pub use pool::{Pool, UsageStats};
pub use source::{PageSource, SegregatedPageSource};
