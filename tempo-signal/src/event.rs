// tempo-signal: Typed notification target
// Ordered listener list with O(1) swap-removal; handles track their own
// slot index so removal never scans

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Slot value marking a handle whose entry has been removed.
const INDEX_NONE: usize = usize::MAX;

type Callback<T> = Arc<dyn Fn(&Event<T>) + Send + Sync>;

/// Shared slot between a listener entry and the handle returned for it.
/// Invariant: while the entry is live, `index` equals the entry's actual
/// position in the listener list.
struct HandleSlot {
    index: AtomicUsize,
}

/// Opaque reference to a registered listener. The only supported
/// operation is [`Event::remove_listener`]; removal is idempotent.
pub struct ListenerHandle {
    slot: Arc<HandleSlot>,
}

struct ListenerEntry<T> {
    callback: Callback<T>,
    slot: Arc<HandleSlot>,
}

/// A typed notification target: an ordered list of listeners plus the
/// payload cached by the most recent [`Event::notify_with_payload`].
///
/// Listener callbacks receive a reference to the event and read the
/// payload through it. The listener list is unlocked around every
/// callback invocation, so listeners may mutate the registration state
/// of the very event that is firing.
pub struct Event<T> {
    listeners: Mutex<Vec<ListenerEntry<T>>>,
    payload: Mutex<Option<T>>,
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            payload: Mutex::new(None),
        }
    }

    /// Append a listener and hand back its removal handle. Amortized O(1).
    pub fn add_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&Event<T>) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        let slot = Arc::new(HandleSlot {
            index: AtomicUsize::new(listeners.len()),
        });
        listeners.push(ListenerEntry {
            callback: Arc::new(callback),
            slot: Arc::clone(&slot),
        });
        ListenerHandle { slot }
    }

    /// Remove the listener behind `handle` in O(1): the last entry is
    /// swapped into the vacated position and its handle's recorded index
    /// is patched to match. Stale handles (already removed, or out of
    /// range) are a silent no-op.
    pub fn remove_listener(&self, handle: &ListenerHandle) {
        let mut listeners = self.listeners.lock();
        let index = handle.slot.index.load(Ordering::Acquire);
        if index >= listeners.len() {
            return;
        }
        if !Arc::ptr_eq(&listeners[index].slot, &handle.slot) {
            return;
        }
        handle.slot.index.store(INDEX_NONE, Ordering::Release);
        listeners.swap_remove(index);
        if let Some(moved) = listeners.get(index) {
            moved.slot.index.store(index, Ordering::Release);
        }
    }

    /// Invoke every listener in current list order, passing a reference
    /// to this event.
    ///
    /// Iteration is positional: the lock is dropped before each callback
    /// runs, and the entry at the next position is re-read afterwards.
    /// A listener that removes itself does not corrupt iteration (the
    /// entry swapped into its slot is simply not revisited this round),
    /// and listeners appended during firing are reached by the same
    /// positional scan once the cursor gets there.
    pub fn fire(&self) {
        let mut cursor = 0;
        loop {
            let callback = {
                let listeners = self.listeners.lock();
                match listeners.get(cursor) {
                    Some(entry) => Arc::clone(&entry.callback),
                    None => break,
                }
            };
            callback(self);
            cursor += 1;
        }
    }

    /// Store `payload` as the event's current payload, then [`fire`].
    /// Firing is synchronous in the calling context.
    ///
    /// [`fire`]: Event::fire
    pub fn notify_with_payload(&self, payload: T) {
        *self.payload.lock() = Some(payload);
        self.fire();
    }

    /// Number of currently registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<T: Clone> Event<T> {
    /// The payload stored by the most recent notification, or `None` if
    /// the event has never carried one.
    pub fn payload(&self) -> Option<T> {
        self.payload.lock().clone()
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}
