// tempo-timeline: Timeline-based event scheduler
// Sorted queue of type-erased triggers dispatched by one of four
// execution strategies

#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! # tempo-timeline
//!
//! Fires type-erased triggers at absolute microsecond instants.
//!
//! ## Key Components
//!
//! - **Timeline**: sorted circular queue over a slab arena; the head is
//!   always the earliest deadline, ties fire in insertion order
//! - **Scheduler**: `schedule` / `delay` / `cancel` / `clear` over the
//!   shared queue, plus the strategy-specific `poll`, `exec` and `stop`
//! - **Strategy**: HighRes (busy-spin), LowRes (OS sleep), Polled
//!   (caller-driven), Background (worker thread parked on a condvar)
//! - **Jitter compensation**: accumulated lateness pre-shifts waits so
//!   steady-state dispatch converges onto the scheduled instant
//!
//! Listener callbacks run synchronously on whichever thread drives the
//! scheduler. The queue lock is never held across a notification, so
//! listeners may schedule, cancel, and re-register freely.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use tempo_signal::{Event, Trigger};
//! use tempo_timeline::{Scheduler, Strategy};
//!
//! let fired = Arc::new(AtomicUsize::new(0));
//! let event = Arc::new(Event::<u32>::new());
//! let count = Arc::clone(&fired);
//! event.add_listener(move |_ev| {
//!     count.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! let scheduler = Scheduler::new(Strategy::Polled);
//! scheduler
//!     .delay(Trigger::new(Arc::clone(&event), 9).into_notify(), 0)
//!     .unwrap();
//! scheduler.poll();
//! assert_eq!(fired.load(Ordering::SeqCst), 1);
//! ```

mod error;
mod jitter;
mod queue;
mod scheduler;

pub use error::TimelineError;
pub use jitter::{Compensation, JitterReport};
pub use queue::NodeRef;
pub use scheduler::{Scheduler, SchedulerBuilder, Strategy};
