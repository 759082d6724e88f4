// tempo-clock: Process-wide monotonic time source
// Microsecond counter derived from the platform's highest-resolution
// monotonic clock, plus the tick/microsecond conversion pair

#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! # tempo-clock
//!
//! The shared clock underneath the tempo scheduler. All readings are
//! monotonic and strictly non-decreasing on a single call site; all
//! functions are thread-safe and lock-free.
//!
//! The tick domain is the nanosecond counter of the platform monotonic
//! clock, anchored to a process-wide epoch taken on first use.
//!
//! ```rust
//! let a = tempo_clock::now_us();
//! let b = tempo_clock::now_us();
//! assert!(b >= a);
//! assert_eq!(tempo_clock::ticks_to_us(tempo_clock::us_to_ticks(250)), 250);
//! ```

mod monotonic;

pub use monotonic::{
    busy_wait_until, now_ticks, now_us, ns_per_tick, ticks_per_microsecond, ticks_per_second,
    ticks_to_us, us_to_ticks,
};
