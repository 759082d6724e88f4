// tempo-signal: Typed events, listener registry, type-erased triggers

#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! # tempo-signal
//!
//! Notification primitives underneath the tempo scheduler.
//!
//! ## Key Components
//!
//! - **Event**: a typed notification target holding an ordered listener
//!   list and the most recent payload
//! - **ListenerHandle**: opaque reference supporting O(1) removal
//! - **Trigger**: an immutable (event, payload) pair
//! - **Notify**: the single type-erased capability the scheduler stores,
//!   so one queue can hold triggers of heterogeneous payload types
//!
//! Firing is synchronous in the calling context. No lock is held across a
//! listener callback, so listeners may add or remove listeners on the same
//! event (including themselves) and schedule further work reentrantly.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use tempo_signal::{Event, Notify, Trigger};
//!
//! let seen = Arc::new(AtomicI64::new(0));
//! let event = Arc::new(Event::<i64>::new());
//! let sink = Arc::clone(&seen);
//! event.add_listener(move |ev: &Event<i64>| {
//!     sink.store(ev.payload().unwrap_or(0), Ordering::SeqCst);
//! });
//!
//! let trigger = Trigger::new(Arc::clone(&event), 42);
//! trigger.notify();
//! assert_eq!(seen.load(Ordering::SeqCst), 42);
//! ```

mod event;
mod trigger;

pub use event::{Event, ListenerHandle};
pub use trigger::{Notify, Trigger};
