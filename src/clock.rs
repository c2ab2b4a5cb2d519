//! Logical clock for totally ordering operations within a log.
//!
//! Every operation carries an `i64` nanosecond timestamp. Wall-clock time is
//! only a hint: the clock emits `max(last_issued + 1, now)`, so values are
//! strictly increasing even when calls outpace the wall clock's resolution or
//! the system clock steps backward (NTP step, VM resume).
//!
//! # Usage
//!
//! ```rust
//! use logbook::clock::LogicalClock;
//!
//! let clock = LogicalClock::new();
//! let a = clock.next_timestamp();
//! let b = clock.next_timestamp();
//! assert!(b > a);
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// LogicalClock
// ---------------------------------------------------------------------------

/// A monotonic nanosecond timestamp source, safe to share between threads.
#[derive(Debug, Default)]
pub struct LogicalClock {
    last: AtomicI64,
}

impl LogicalClock {
    /// Create a clock that has issued nothing yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Resume from a known last-issued value (e.g. the newest timestamp found
    /// in a loaded log). The next value is strictly greater than `last`.
    #[must_use]
    pub const fn resume(last: i64) -> Self {
        Self {
            last: AtomicI64::new(last),
        }
    }

    /// Issue the next timestamp using the system wall clock.
    pub fn next_timestamp(&self) -> i64 {
        self.next_with_clock(current_time_ns())
    }

    /// Issue the next timestamp against a provided wall-clock reading.
    ///
    /// This is primarily for testing; production code calls
    /// [`Self::next_timestamp`].
    pub fn next_with_clock(&self, now_ns: i64) -> i64 {
        let step = |last: i64| last.saturating_add(1).max(now_ns);
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(step(last)))
            .unwrap_or_else(|last| last);
        step(prev)
    }

    /// Make sure every future timestamp is greater than `ts`.
    pub fn observe(&self, ts: i64) {
        self.last.fetch_max(ts, Ordering::SeqCst);
    }

    /// The last value issued or observed (0 if none yet).
    #[must_use]
    pub fn last_issued(&self) -> i64 {
        self.last.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Process-wide clock
// ---------------------------------------------------------------------------

static PROCESS_CLOCK: LogicalClock = LogicalClock::new();

/// Issue a timestamp from the process-wide clock.
///
/// Useful for stamping commit metadata outside a [`Book`](crate::book::Book);
/// each book still orders its own operations with its own clock.
pub fn new_timestamp() -> i64 {
    PROCESS_CLOCK.next_timestamp()
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
fn current_time_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn follows_wall_clock_when_it_moves_forward() {
        let clock = LogicalClock::new();
        assert_eq!(clock.next_with_clock(1_000), 1_000);
        assert_eq!(clock.next_with_clock(5_000), 5_000);
    }

    #[test]
    fn faster_than_resolution_still_increases() {
        let clock = LogicalClock::new();
        let a = clock.next_with_clock(1_000);
        let b = clock.next_with_clock(1_000);
        let c = clock.next_with_clock(1_000);
        assert_eq!((a, b, c), (1_000, 1_001, 1_002));
    }

    #[test]
    fn backward_jump_is_clamped() {
        let clock = LogicalClock::new();
        clock.next_with_clock(10_000);
        assert_eq!(clock.next_with_clock(3), 10_001);
    }

    #[test]
    fn resume_continues_after_last() {
        let clock = LogicalClock::resume(42);
        assert_eq!(clock.next_with_clock(0), 43);
    }

    #[test]
    fn observe_pushes_the_floor_up() {
        let clock = LogicalClock::new();
        clock.observe(900);
        assert_eq!(clock.next_with_clock(100), 901);
        clock.observe(10);
        assert_eq!(clock.last_issued(), 901);
    }

    #[test]
    fn system_clock_values_are_strictly_increasing() {
        let clock = LogicalClock::new();
        let mut prev = clock.next_timestamp();
        for _ in 0..10_000 {
            let next = clock.next_timestamp();
            assert!(next > prev, "{next} must exceed {prev}");
            prev = next;
        }
    }

    #[test]
    fn process_clock_is_monotonic() {
        let a = new_timestamp();
        let b = new_timestamp();
        assert!(b > a);
    }

    #[test]
    fn concurrent_callers_never_collide() {
        let clock = Arc::new(LogicalClock::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || {
                    (0..1_000)
                        .map(|_| clock.next_with_clock(7))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for ts in handle.join().unwrap() {
                assert!(seen.insert(ts), "timestamp {ts} issued twice");
            }
        }
        assert_eq!(seen.len(), 8_000);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_strictly_increasing(readings in proptest::collection::vec(any::<i64>(), 1..200)) {
                let clock = LogicalClock::new();
                let mut prev = i64::MIN;
                for now in readings {
                    let next = clock.next_with_clock(now);
                    prop_assert!(next > prev || (prev == i64::MAX && next == i64::MAX));
                    prop_assert!(next >= now);
                    prev = next;
                }
            }
        }
    }
}
