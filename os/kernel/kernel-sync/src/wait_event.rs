use crate::Clock;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

/// Why a [`WaitEvent::wait_timeout`] call returned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WakeReason {
    /// Someone called [`WaitEvent::signal`] since the last consumed wake.
    Signalled,
    /// The deadline passed without a signal.
    TimedOut,
}

/// A single-waiter "work pending" latch with a timeout.
///
/// Signalling is one atomic store, so it is safe from any context including
/// the ones that must never block. Repeated signals before the waiter runs
/// coalesce into one wake.
///
/// The waiter polls the latch and the deadline, calling [`Clock::relax`]
/// between polls; how idle that is depends on the clock (`pause`, `hlt`,
/// a scheduler yield, ...).
///
/// # Examples
///
/// ```
/// use core::time::Duration;
/// use kernel_sync::{Clock, WaitEvent, WakeReason};
///
/// struct Frozen;
/// impl Clock for Frozen {
///     fn now(&self) -> Duration { Duration::ZERO }
/// }
///
/// let ev = WaitEvent::new();
/// ev.signal();
/// assert_eq!(ev.wait_timeout(&Frozen, Duration::from_secs(1)), WakeReason::Signalled);
/// ```
pub struct WaitEvent {
    pending: AtomicBool,
}

impl Default for WaitEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitEvent {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Mark work as pending. Never blocks.
    #[inline]
    pub fn signal(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Whether a signal is latched and not yet consumed.
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Consume a latched signal without waiting.
    #[inline]
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::Acquire)
    }

    /// Wait until signalled or until `timeout` has elapsed on `clock`.
    ///
    /// A signal that arrived before the call is consumed immediately.
    pub fn wait_timeout<C: Clock + ?Sized>(&self, clock: &C, timeout: Duration) -> WakeReason {
        let deadline = clock.now().saturating_add(timeout);
        loop {
            if self.take() {
                return WakeReason::Signalled;
            }
            if clock.now() >= deadline {
                return WakeReason::TimedOut;
            }
            clock.relax();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    /// Advances by a fixed step on every read.
    struct SteppingClock {
        now: Cell<Duration>,
        step: Duration,
    }

    impl Clock for SteppingClock {
        fn now(&self) -> Duration {
            let t = self.now.get();
            self.now.set(t + self.step);
            t
        }
    }

    #[test]
    fn times_out_without_signal() {
        let clock = SteppingClock {
            now: Cell::new(Duration::ZERO),
            step: Duration::from_millis(10),
        };
        let ev = WaitEvent::new();
        assert_eq!(
            ev.wait_timeout(&clock, Duration::from_millis(50)),
            WakeReason::TimedOut
        );
        assert!(clock.now() >= Duration::from_millis(50));
    }

    #[test]
    fn signals_coalesce() {
        let clock = SteppingClock {
            now: Cell::new(Duration::ZERO),
            step: Duration::from_millis(1),
        };
        let ev = WaitEvent::new();
        ev.signal();
        ev.signal();
        assert!(ev.is_pending());
        assert_eq!(
            ev.wait_timeout(&clock, Duration::from_secs(1)),
            WakeReason::Signalled
        );
        assert!(!ev.is_pending());
        assert_eq!(
            ev.wait_timeout(&clock, Duration::from_millis(3)),
            WakeReason::TimedOut
        );
    }

    #[test]
    fn zero_timeout_still_sees_latched_signal() {
        let clock = SteppingClock {
            now: Cell::new(Duration::ZERO),
            step: Duration::ZERO,
        };
        let ev = WaitEvent::new();
        ev.signal();
        assert_eq!(ev.wait_timeout(&clock, Duration::ZERO), WakeReason::Signalled);
        assert_eq!(ev.wait_timeout(&clock, Duration::ZERO), WakeReason::TimedOut);
    }
}
