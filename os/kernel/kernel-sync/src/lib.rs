//! # Kernel synchronization primitives
//!
//! * [`SpinLock`]: the lock used for short critical sections that must never
//!   sleep, e.g. a single page pool on the allocation fast path.
//! * [`WaitEvent`]: a "timer elapsed OR work pending" latch for one
//!   background worker, driven by a [`Clock`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod spin_lock;
mod wait_event;

use core::time::Duration;

pub use spin_lock::{SpinLock, SpinLockGuard};
pub use wait_event::{WaitEvent, WakeReason};

/// Monotonic time source for timed waits.
pub trait Clock {
    /// Time since an arbitrary, fixed origin. Must never go backwards.
    fn now(&self) -> Duration;

    /// Called between polls while waiting.
    ///
    /// The default is only a CPU spin hint, so a waiter on such a clock keeps
    /// its core busy for the whole wait. Clocks driving a long-lived worker
    /// should override this with a real idle: `hlt` until the next timer
    /// interrupt, a scheduler yield, or a host sleep.
    #[inline]
    fn relax(&self) {
        core::hint::spin_loop();
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn relax(&self) {
        (**self).relax();
    }
}
