use core::sync::atomic::{AtomicBool, Ordering};

use uom::si::f32::Time;

/// Monotonic time source used by the control loops.
pub trait Clock {
    fn now(&self) -> Time;

    /// Blocks until `period` has passed since the previous call returned.
    fn delay_until(&mut self, period: Time);
}

impl<T: Clock + ?Sized> Clock for &mut T {
    fn now(&self) -> Time {
        (**self).now()
    }

    fn delay_until(&mut self, period: Time) {
        (**self).delay_until(period)
    }
}

/// Flag checked by every control loop iteration.
#[derive(Debug, Default)]
pub struct Cancellation {
    cancelled: AtomicBool,
}

impl Cancellation {
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(feature = "std")]
pub use self::std_clock::StdClock;

#[cfg(feature = "std")]
mod std_clock {
    use std::time::{Duration, Instant};

    use uom::si::{f32::Time, time::second};

    use super::Clock;

    #[derive(Debug)]
    pub struct StdClock {
        origin: Instant,
        last: Option<Instant>,
    }

    impl StdClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                last: None,
            }
        }
    }

    impl Default for StdClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for StdClock {
        fn now(&self) -> Time {
            Time::new::<second>(self.origin.elapsed().as_secs_f32())
        }

        fn delay_until(&mut self, period: Time) {
            let period = Duration::from_secs_f32(period.get::<second>().max(0.0));
            let now = Instant::now();
            let target = self.last.map_or(now + period, |last| last + period);
            if target > now {
                std::thread::sleep(target - now);
                self.last = Some(target);
            } else {
                // fell behind, restart the cadence from now
                self.last = Some(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation() {
        let token = Cancellation::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!token.is_cancelled());
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_std_clock_delay() {
        use uom::si::time::millisecond;

        let mut clock = StdClock::new();
        let start = clock.now();
        clock.delay_until(Time::new::<millisecond>(5.0));
        clock.delay_until(Time::new::<millisecond>(5.0));
        assert!(clock.now() - start >= Time::new::<millisecond>(9.0));
    }
}
