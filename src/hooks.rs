//! Policy callbacks an [`EventQueue`](crate::queue::EventQueue) consults
//! while dequeuing, and lifecycle notifications the runtime fires around an
//! actor's handler loop.
//!
//! Keeping these as a narrow trait rather than baking ignore/defer logic
//! into the queue itself lets [`TableActor`](crate::actor::TableActor) and
//! [`StateMachine`](crate::state_machine::StateMachine) supply very
//! different policies (a flat dispatch table vs. a stack of hierarchical
//! states) without the queue knowing which kind of entity it belongs to.

use crate::event::EventTypeId;

/// Reason a queue dropped an event, reported to
/// [`ActorManagerHooks::on_event_dropped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The target actor had already halted.
    Halted,
    /// The current state's dispatch table marks this event type as ignored.
    Ignored,
}

/// Policy queried by an [`EventQueue`](crate::queue::EventQueue) at each
/// dequeue, and lifecycle hooks fired by the owning runtime.
///
/// Implementations are consulted while the queue's lock is held, so they
/// must not block or re-enter the queue — they answer purely from the
/// entity's own (already-owned) dispatch state.
pub trait ActorManagerHooks: Send + Sync {
    /// Whether `event_type` is ignored in the entity's current dispatch
    /// state (to be discarded, not deferred).
    fn is_ignored(&self, event_type: EventTypeId) -> bool;

    /// Whether `event_type` is deferred in the entity's current dispatch
    /// state (left in the queue for a later state to handle).
    fn is_deferred(&self, event_type: EventTypeId) -> bool;

    /// Whether a default handler is installed for the entity's current
    /// dispatch state, making a synthetic [`DefaultEvent`](crate::event::DefaultEvent)
    /// available when the FIFO is empty or fully deferred.
    fn has_default_handler(&self) -> bool;

    /// Fired once a dequeue or enqueue drops an event, after it has already
    /// left the queue. Never fired for an event consumed by a receive or a
    /// dispatched handler.
    fn on_event_dropped(&self, _event_type: EventTypeId, _reason: DropReason) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// A hand-wired policy for unit tests: explicit ignore/defer sets and an
    /// optional default handler flag, with dropped events recorded for
    /// assertions.
    pub struct FixedPolicy {
        pub ignored: HashSet<EventTypeId>,
        pub deferred: HashSet<EventTypeId>,
        pub default_handler: bool,
        pub dropped: Mutex<Vec<(EventTypeId, DropReason)>>,
    }

    impl FixedPolicy {
        pub fn new() -> Self {
            FixedPolicy {
                ignored: HashSet::new(),
                deferred: HashSet::new(),
                default_handler: false,
                dropped: Mutex::new(Vec::new()),
            }
        }
    }

    impl ActorManagerHooks for FixedPolicy {
        fn is_ignored(&self, event_type: EventTypeId) -> bool {
            self.ignored.contains(&event_type)
        }

        fn is_deferred(&self, event_type: EventTypeId) -> bool {
            self.deferred.contains(&event_type)
        }

        fn has_default_handler(&self) -> bool {
            self.default_handler
        }

        fn on_event_dropped(&self, event_type: EventTypeId, reason: DropReason) {
            self.dropped.lock().unwrap().push((event_type, reason));
        }
    }
}
