//! Millisecond tick source
//!
//! The transport measures its transmit timeout and its settle delays in ticks. Any wrapping
//! `u32` counter works; [`TickCounter`] is a ready-made one for a 1 kHz system tick interrupt.
//!
//! ```no_run
//! use usbd_vcom::{TickCounter, Ticks};
//!
//! static TICKS: TickCounter = TickCounter::new();
//!
//! // In the SysTick exception handler:
//! TICKS.increment();
//!
//! // Anywhere else:
//! let start = TICKS.now();
//! TICKS.wait(10);
//! assert!(TICKS.elapsed_since(start) >= 10);
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

/// A wrapping millisecond counter.
pub trait Ticks {
    /// The current counter value. Wraps from `u32::MAX` to zero.
    fn now(&self) -> u32;

    /// Ticks elapsed since `start`, correct across a single counter wrap.
    fn elapsed_since(&self, start: u32) -> u32 {
        self.now().wrapping_sub(start)
    }

    /// Spins until at least `ticks` ticks have passed.
    fn wait(&self, ticks: u32) {
        let start = self.now();
        while self.elapsed_since(start) < ticks {
            core::hint::spin_loop();
        }
    }
}

impl<T: Ticks + ?Sized> Ticks for &T {
    fn now(&self) -> u32 {
        (**self).now()
    }
}

/// Tick counter advanced by the system tick interrupt.
#[derive(Debug, Default)]
pub struct TickCounter {
    count: AtomicU32,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    /// Advance by one tick. Call this from the tick interrupt only.
    pub fn increment(&self) {
        let next = self.count.load(Ordering::Relaxed).wrapping_add(1);
        self.count.store(next, Ordering::Release);
    }
}

impl Ticks for TickCounter {
    fn now(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::{TickCounter, Ticks};
    use core::cell::Cell;

    /// Advances by one every time it's read.
    struct Stepping {
        now: Cell<u32>,
        reads: Cell<u32>,
    }

    impl Stepping {
        fn starting_at(now: u32) -> Self {
            Self {
                now: Cell::new(now),
                reads: Cell::new(0),
            }
        }
    }

    impl Ticks for Stepping {
        fn now(&self) -> u32 {
            let now = self.now.get();
            self.now.set(now.wrapping_add(1));
            self.reads.set(self.reads.get() + 1);
            now
        }
    }

    #[test]
    fn counter_increments() {
        let ticks = TickCounter::new();
        assert_eq!(ticks.now(), 0);

        ticks.increment();
        ticks.increment();
        assert_eq!(ticks.now(), 2);
    }

    #[test]
    fn counter_wraps() {
        let ticks = TickCounter::new();
        ticks.count.store(u32::MAX, core::sync::atomic::Ordering::Relaxed);

        ticks.increment();
        assert_eq!(ticks.now(), 0);
    }

    #[test]
    fn elapsed_across_wrap() {
        let ticks = TickCounter::new();
        ticks.count.store(3, core::sync::atomic::Ordering::Relaxed);
        assert_eq!(ticks.elapsed_since(0xFFFF_FFFE), 5);
    }

    #[test]
    fn wait_across_wrap() {
        let ticks = Stepping::starting_at(0xFFFF_FFF0);
        ticks.wait(32);

        // The final read returned 0x10, so the counter now points one past it.
        assert_eq!(ticks.now.get(), 0x11);
        assert_eq!(ticks.reads.get(), 33);
    }

    #[test]
    fn wait_zero_returns_immediately() {
        let ticks = Stepping::starting_at(7);
        ticks.wait(0);
        assert_eq!(ticks.reads.get(), 2);
    }

    #[test]
    fn reference_forwards() {
        let ticks = TickCounter::new();
        ticks.increment();
        let by_ref: &TickCounter = &ticks;
        assert_eq!(Ticks::now(&by_ref), 1);
    }
}
