// tempo-signal: Type-erased work items
// A trigger binds one event to one payload value; the scheduler only ever
// sees the erased Notify capability

use std::sync::Arc;

use crate::event::Event;

/// The single type-erased capability a scheduler queue stores: deliver
/// the bound payload to the bound event. The concrete `(Event<T>, T)`
/// pair stays hidden behind this trait so triggers of heterogeneous
/// payload types share one queue.
pub trait Notify: Send + Sync {
    /// Store the bound payload in the bound event and fire its listeners
    /// synchronously in the calling context.
    fn notify(&self);
}

/// Immutable pairing of an event and one payload value of its type.
///
/// A trigger may be handed to a scheduler any number of times; each
/// schedule entry executes it at most once.
pub struct Trigger<T> {
    event: Arc<Event<T>>,
    payload: T,
}

impl<T> Trigger<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(event: Arc<Event<T>>, payload: T) -> Self {
        Self { event, payload }
    }

    /// The event this trigger notifies.
    pub fn event(&self) -> &Arc<Event<T>> {
        &self.event
    }

    /// The payload delivered on [`Notify::notify`].
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Erase the payload type for storage in a scheduler queue.
    pub fn into_notify(self) -> Arc<dyn Notify> {
        Arc::new(self)
    }
}

impl<T> Notify for Trigger<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn notify(&self) {
        self.event.notify_with_payload(self.payload.clone());
    }
}
