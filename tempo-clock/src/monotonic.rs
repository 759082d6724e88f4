// tempo-clock: Monotonic microsecond counter and tick conversions
// Epoch is captured once at first use; readings never go backwards

use std::hint;
use std::sync::OnceLock;
use std::time::Instant;

const TICKS_PER_SECOND: i64 = 1_000_000_000;
const MICROS_PER_SECOND: i64 = 1_000_000;

/// Process-wide epoch for the monotonic counters. Captured exactly once;
/// every reading is the elapsed time since this instant.
fn epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Native tick frequency of the clock. The tick domain is the nanosecond
/// counter of the platform monotonic clock.
#[inline]
pub fn ticks_per_second() -> i64 {
    TICKS_PER_SECOND
}

/// Ticks per microsecond, clamped to one when the native frequency falls
/// below one tick per microsecond so conversions never divide by zero.
#[inline]
pub fn ticks_per_microsecond() -> i64 {
    let per_us = ticks_per_second() / MICROS_PER_SECOND;
    if per_us < 1 {
        1
    } else {
        per_us
    }
}

/// Nanoseconds spanned by a single tick.
#[inline]
pub fn ns_per_tick() -> f64 {
    1_000_000_000.0 / ticks_per_second() as f64
}

/// Current reading of the native tick counter.
#[inline]
pub fn now_ticks() -> i64 {
    epoch().elapsed().as_nanos() as i64
}

/// Current monotonic time in microseconds since the process epoch.
#[inline]
pub fn now_us() -> i64 {
    ticks_to_us(now_ticks())
}

/// Convert native ticks to microseconds (truncating toward zero).
#[inline]
pub fn ticks_to_us(ticks: i64) -> i64 {
    ticks / ticks_per_microsecond()
}

/// Convert microseconds to native ticks.
#[inline]
pub fn us_to_ticks(us: i64) -> i64 {
    us * ticks_per_microsecond()
}

/// Spin on the monotonic clock until it reaches `deadline_us`. Never
/// sleeps or yields to the OS; CPU cost is 100% for the whole wait.
/// Returns the observed lateness in microseconds (zero or more).
pub fn busy_wait_until(deadline_us: i64) -> i64 {
    loop {
        let now = now_us();
        if now >= deadline_us {
            return now - deadline_us;
        }
        hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn readings_are_monotonic() {
        let mut prev = now_us();
        for _ in 0..10_000 {
            let next = now_us();
            assert!(next >= prev, "clock went backwards: {} -> {}", prev, next);
            prev = next;
        }
    }

    #[test]
    fn tick_frequency_is_at_least_one_per_microsecond() {
        assert!(ticks_per_microsecond() >= 1);
        assert!(ticks_per_second() >= MICROS_PER_SECOND);
    }

    #[test_case(0)]
    #[test_case(1)]
    #[test_case(250)]
    #[test_case(1_000_000)]
    #[test_case(-37)]
    fn conversion_round_trips_within_native_rounding(us: i64) {
        let round_tripped = ticks_to_us(us_to_ticks(us));
        assert!((round_tripped - us).abs() <= 1);
    }

    #[test]
    fn ns_per_tick_matches_frequency() {
        let ns = ns_per_tick();
        assert!((ns * ticks_per_second() as f64 - 1e9).abs() < 1e-3);
    }

    #[test]
    fn busy_wait_reaches_deadline_without_sleeping() {
        let deadline = now_us() + 2_000;
        let lateness = busy_wait_until(deadline);
        assert!(now_us() >= deadline);
        assert!(lateness >= 0);
    }

    #[test]
    fn busy_wait_on_past_deadline_returns_immediately() {
        let lateness = busy_wait_until(now_us() - 1_000);
        assert!(lateness >= 1_000);
    }
}
