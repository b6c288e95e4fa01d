use std::hint;
use std::thread;

/// Exponential backoff for the two waits in the queue protocol.
///
/// A commit waiting on an earlier ticket calls [`snooze`](Self::snooze) in a
/// loop and never gives up. A producer retrying a full queue uses
/// [`is_completed`](Self::is_completed) to decide when to stop.
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6; // 2^6 = 64 PAUSE hints per round before yielding
    const YIELD_LIMIT: u32 = 10;

    /// Creates a new backoff instance.
    #[inline]
    pub const fn new() -> Self {
        Self { step: 0 }
    }

    /// Spins with PAUSE hints, doubling the spin count each call up to the limit.
    #[inline]
    pub fn spin(&mut self) {
        for _ in 0..1u32 << self.step.min(Self::SPIN_LIMIT) {
            hint::spin_loop();
        }
        if self.step <= Self::SPIN_LIMIT {
            self.step += 1;
        }
    }

    /// Spins while the wait is short, then yields the thread to the OS.
    ///
    /// Once past the yield limit every call yields; the step stops growing.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            self.spin();
        } else {
            thread::yield_now();
            if self.step <= Self::YIELD_LIMIT {
                self.step += 1;
            }
        }
    }

    /// Returns true once a bounded retry loop should give up.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.step > Self::YIELD_LIMIT
    }

    /// Reset for next wait cycle.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}
