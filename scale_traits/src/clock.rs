use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time source for pacing bus traffic and stamping fill cycles.
///
/// - now(): monotonic Instant used for spacing and staleness checks
/// - sleep(): blocks for the provided duration (implementations may simulate)
/// - unix_ms(): wall-clock milliseconds since the Unix epoch, used for records
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    fn unix_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_millis() as u64
    }
}

/// Real-time clock backed by `std::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_clock {
    use super::*;
    use std::sync::{Arc, Mutex, PoisonError};

    /// Deterministic clock whose time only moves when advanced.
    ///
    /// `sleep(d)` advances the shared offset by `d` without blocking, so a
    /// worker thread pacing itself with this clock runs at full speed while
    /// every observer still sees the exact spacing it asked for.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        unix_origin_ms: i64,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self::starting_at_unix_ms(1_700_000_000_000)
        }

        /// Pin the wall-clock reading reported at offset zero.
        pub fn starting_at_unix_ms(unix_origin_ms: i64) -> Self {
            Self {
                origin: Instant::now(),
                unix_origin_ms,
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        pub fn advance(&self, d: Duration) {
            let mut off = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
            *off = off.saturating_add(d);
        }

        pub fn elapsed(&self) -> Duration {
            *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }

        fn unix_ms(&self) -> i64 {
            self.unix_origin_ms + self.elapsed().as_millis() as i64
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn sleep_advances_both_time_bases() {
            let clock = TestClock::starting_at_unix_ms(1_000);
            let t0 = clock.now();
            clock.sleep(Duration::from_millis(250));
            assert_eq!(clock.ms_since(t0), 250);
            assert_eq!(clock.unix_ms(), 1_250);
        }

        #[test]
        fn clones_share_the_offset() {
            let a = TestClock::new();
            let b = a.clone();
            a.advance(Duration::from_millis(40));
            assert_eq!(b.elapsed(), Duration::from_millis(40));
        }
    }
}
