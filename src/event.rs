//! Named-listener event fan-out, shared by `Query`, `Scheduler`, and
//! `World` for their respective event surfaces.

use std::any::Any;
use std::sync::Arc;

use fxhash::FxHashMap;

/// Handle returned by `EventDispatcher::add`, used to `remove` a
/// listener later. Stable for the lifetime of the dispatcher.
pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Diagnostic snapshot of a dispatcher's lifetime activity, surfaced
/// through `World::stats()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatcherStats {
    /// Number of `dispatch` calls made, regardless of listener count.
    pub fired: u64,
    /// Number of individual listener invocations across all dispatches.
    pub handled: u64,
}

/// A registry of named event listeners.
///
/// `dispatch` clones the listener list for the event name before
/// invoking any of them, so a listener that adds or removes listeners
/// of its own (including for the event currently being dispatched)
/// never observes a half-mutated iteration and never panics on a
/// concurrent borrow.
#[derive(Default)]
pub(crate) struct EventDispatcher {
    listeners: FxHashMap<String, Vec<(ListenerId, Listener)>>,
    next_id: ListenerId,
    fired: u64,
    handled: u64,
}

impl EventDispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` under `name`, returning a handle that can
    /// later be passed to `remove`.
    pub(crate) fn add<F>(&mut self, name: &str, listener: F) -> ListenerId
    where
        F: Fn(&dyn Any) + Send + Sync + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a previously registered listener. Returns `true` if a
    /// listener with that id existed.
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        for bucket in self.listeners.values_mut() {
            if let Some(pos) = bucket.iter().position(|(lid, _)| *lid == id) {
                bucket.remove(pos);
                return true;
            }
        }
        false
    }

    pub(crate) fn has(&self, name: &str) -> bool {
        self.listeners
            .get(name)
            .map(|bucket| !bucket.is_empty())
            .unwrap_or(false)
    }

    /// Invokes every listener registered for `name` with `payload`.
    /// Missing-name dispatch is a no-op, not an error.
    pub(crate) fn dispatch(&mut self, name: &str, payload: &dyn Any) {
        self.fired += 1;
        let Some(bucket) = self.listeners.get(name) else {
            return;
        };
        let snapshot: Vec<Listener> = bucket.iter().map(|(_, f)| Arc::clone(f)).collect();
        for listener in &snapshot {
            listener(payload);
            self.handled += 1;
        }
    }

    pub(crate) fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            fired: self.fired,
            handled: self.handled,
        }
    }

    pub(crate) fn reset_counters(&mut self) {
        self.fired = 0;
        self.handled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatch_invokes_all_listeners_for_name() {
        let mut dispatcher = EventDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&calls);
        let c2 = Arc::clone(&calls);
        dispatcher.add("tick", move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.add("tick", move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.dispatch("tick", &());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            dispatcher.stats(),
            DispatcherStats {
                fired: 1,
                handled: 2
            }
        );
    }

    #[test]
    fn dispatch_on_unknown_name_is_a_silent_no_op() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.dispatch("nothing-listens-here", &());
        assert_eq!(dispatcher.stats().handled, 0);
    }

    #[test]
    fn listener_removed_before_dispatch_never_runs() {
        let mut dispatcher = EventDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let doomed = dispatcher.add("tick", move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.remove(doomed);
        dispatcher.dispatch("tick", &());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remove_returns_false_for_unknown_id() {
        let mut dispatcher = EventDispatcher::new();
        assert!(!dispatcher.remove(9999));
    }
}
