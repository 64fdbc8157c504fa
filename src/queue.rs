//! The per-actor event queue: a FIFO inbox plus a single-slot raise buffer
//! and an optional pending receive, with the dequeue protocol from the
//! specification's §4.1 implemented exactly in priority order.
//!
//! All mutation happens under a single `Mutex` that is never held across
//! user code — every public method here takes the lock, mutates a small
//! amount of state, and releases it before returning (or before invoking a
//! completer callback, which itself must not re-enter the queue).

use std::collections::VecDeque;
use std::sync::Mutex;

use smallvec::SmallVec;

use crate::event::{BoxedEvent, EventInfo, EventTypeId, InboxEntry};
use crate::hooks::{ActorManagerHooks, DropReason};
use crate::id::EventGroup;

/// Outcome of [`EventQueue::enqueue`].
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// A pending receive matched this event; the event never touched the
    /// FIFO and the queue's size is unchanged.
    Received,
    /// The actor had already halted, or a policy dropped the event.
    Dropped,
    /// Appended to the FIFO; a handler task is already running and will
    /// dequeue it in turn.
    EventHandlerRunning,
    /// Appended to the FIFO; no handler task was running, so the queue has
    /// marked itself as running and the caller must start one.
    EventHandlerNotRunning,
}

/// Outcome of [`EventQueue::dequeue`].
pub enum DequeueOutcome {
    /// The single-slot raised event, always returned ahead of the FIFO.
    Raised(BoxedEvent, EventGroup),
    /// The next FIFO event not ignored or deferred in the current state.
    Success(InboxEntry),
    /// The FIFO was empty or fully deferred, and a default handler is
    /// installed; a synthetic `DefaultEvent` should be dispatched.
    Default,
    /// Nothing can be dequeued right now. The queue has already cleared its
    /// running flag; the handler loop must exit.
    NotAvailable,
}

/// A function called exactly once, off the queue's lock, to deliver an event
/// to a suspended `ReceiveEventAsync` caller.
pub type Completer = Box<dyn FnOnce(BoxedEvent, EventGroup, EventInfo) + Send>;

/// A registered, not-yet-fulfilled receive request.
pub struct PendingReceive {
    awaited: SmallVec<[EventTypeId; 4]>,
    predicate: Option<Box<dyn Fn(&BoxedEvent) -> bool + Send>>,
    completer: Completer,
}

impl PendingReceive {
    pub fn new(
        awaited: impl Into<SmallVec<[EventTypeId; 4]>>,
        predicate: Option<Box<dyn Fn(&BoxedEvent) -> bool + Send>>,
        completer: Completer,
    ) -> Self {
        PendingReceive {
            awaited: awaited.into(),
            predicate,
            completer,
        }
    }

    fn matches(&self, entry: &InboxEntry) -> bool {
        self.awaited.contains(&entry.event_type())
            && self
                .predicate
                .as_ref()
                .map_or(true, |p| p(&entry.event))
    }
}

/// Error returned by [`EventQueue::raise`] when a raise is already pending.
#[derive(Debug, thiserror::Error)]
#[error("an event is already raised and awaiting consumption")]
pub struct RaiseAlreadyPending;

/// Error returned by [`EventQueue::close`] when a receive was still pending.
#[derive(Debug, thiserror::Error)]
#[error("invoked ReceiveEventAsync while halting")]
pub struct ReceivePendingAtHalt;

struct QueueState {
    fifo: VecDeque<InboxEntry>,
    raised: Option<(BoxedEvent, EventGroup, EventInfo)>,
    pending_receive: Option<PendingReceive>,
    handler_running: bool,
    halted: bool,
}

/// The per-actor inbox. See the module documentation and specification
/// §4.1 for the exact semantics of each operation.
pub struct EventQueue {
    state: Mutex<QueueState>,
}

impl EventQueue {
    pub fn new() -> Self {
        EventQueue {
            state: Mutex::new(QueueState {
                fifo: VecDeque::new(),
                raised: None,
                pending_receive: None,
                handler_running: false,
                halted: false,
            }),
        }
    }

    /// Enqueues an event, or routes it straight to a pending receive if one
    /// matches, per the priority rules in §4.1.
    pub fn enqueue(
        &self,
        event: BoxedEvent,
        group: EventGroup,
        info: EventInfo,
        hooks: &dyn ActorManagerHooks,
    ) -> EnqueueOutcome {
        let mut state = self.state.lock().unwrap();

        if state.halted {
            hooks.on_event_dropped(event.event_type(), DropReason::Halted);
            return EnqueueOutcome::Dropped;
        }

        let entry = InboxEntry::new(event, group, info);
        if let Some(pending) = &state.pending_receive {
            if pending.matches(&entry) {
                let pending = state.pending_receive.take().unwrap();
                let InboxEntry { event, group, info } = entry;
                drop(state);
                (pending.completer)(event, group, info);
                return EnqueueOutcome::Received;
            }
        }

        state.fifo.push_back(entry);
        if state.handler_running {
            EnqueueOutcome::EventHandlerRunning
        } else {
            state.handler_running = true;
            EnqueueOutcome::EventHandlerNotRunning
        }
    }

    /// Dequeues the next event to dispatch, per the strict priority order:
    /// raised event, then first non-ignored/non-deferred FIFO entry, then a
    /// synthesized default, then `NotAvailable`.
    pub fn dequeue(&self, hooks: &dyn ActorManagerHooks) -> DequeueOutcome {
        let mut state = self.state.lock().unwrap();

        if let Some((event, group, _info)) = state.raised.take() {
            return DequeueOutcome::Raised(event, group);
        }

        let mut index = 0;
        while index < state.fifo.len() {
            let event_type = state.fifo[index].event_type();
            if hooks.is_ignored(event_type) {
                let entry = state.fifo.remove(index).unwrap();
                hooks.on_event_dropped(entry.event_type(), DropReason::Ignored);
                continue;
            }
            if hooks.is_deferred(event_type) {
                index += 1;
                continue;
            }
            let entry = state.fifo.remove(index).unwrap();
            return DequeueOutcome::Success(entry);
        }

        if hooks.has_default_handler() {
            return DequeueOutcome::Default;
        }

        state.handler_running = false;
        DequeueOutcome::NotAvailable
    }

    /// Places `event` into the single-slot raise buffer. Fails if a raise is
    /// already pending — at most one raised event may await consumption at
    /// a time.
    pub fn raise(
        &self,
        event: BoxedEvent,
        group: EventGroup,
        info: EventInfo,
    ) -> Result<(), RaiseAlreadyPending> {
        let mut state = self.state.lock().unwrap();
        if state.raised.is_some() {
            return Err(RaiseAlreadyPending);
        }
        state.raised = Some((event, group, info));
        Ok(())
    }

    /// Scans the FIFO immediately for an event matching `awaited`/`predicate`
    /// and removes+returns it if found (the "received without waiting"
    /// case). Returns `None` if nothing matches yet.
    pub fn try_receive_now(
        &self,
        awaited: &[EventTypeId],
        predicate: Option<&(dyn Fn(&BoxedEvent) -> bool)>,
    ) -> Option<InboxEntry> {
        let mut state = self.state.lock().unwrap();
        let index = state.fifo.iter().position(|entry| {
            awaited.contains(&entry.event_type())
                && predicate.map_or(true, |p| p(&entry.event))
        })?;
        state.fifo.remove(index)
    }

    /// Registers a pending receive to be fulfilled by a future `enqueue`.
    /// Caller must have already failed a `try_receive_now` scan.
    pub fn register_pending_receive(&self, pending: PendingReceive) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(
            state.pending_receive.is_none(),
            "at most one pending receive per actor"
        );
        state.pending_receive = Some(pending);
    }

    /// True while a handler task owns this queue's dispatch loop.
    pub fn is_handler_running(&self) -> bool {
        self.state.lock().unwrap().handler_running
    }

    /// Number of events currently sitting in the FIFO (does not count a
    /// raised event).
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_halted(&self) -> bool {
        self.state.lock().unwrap().halted
    }

    /// Closes the queue: marks it halted so subsequent enqueues are dropped.
    /// Returns an error if a receive was still pending — an unfulfilled
    /// receive at halt time is a fatal, user-visible error, not a silent
    /// cancellation.
    pub fn close(&self) -> Result<(), ReceivePendingAtHalt> {
        let mut state = self.state.lock().unwrap();
        state.halted = true;
        if state.pending_receive.take().is_some() {
            return Err(ReceivePendingAtHalt);
        }
        Ok(())
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        EventQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventTypeId;
    use crate::hooks::test_support::FixedPolicy;
    use crate::id::ActorId;

    #[derive(Debug)]
    struct A;
    #[derive(Debug)]
    struct B;

    fn info() -> EventInfo {
        EventInfo::new(ActorId::new("Origin"), None, EventGroup::root(), 0)
    }

    #[test]
    fn enqueue_onto_empty_queue_reports_handler_not_running() {
        let q = EventQueue::new();
        let policy = FixedPolicy::new();
        let outcome = q.enqueue(Box::new(A), EventGroup::root(), info(), &policy);
        assert!(matches!(outcome, EnqueueOutcome::EventHandlerNotRunning));
        assert!(q.is_handler_running());
    }

    #[test]
    fn enqueue_while_running_appends_to_fifo() {
        let q = EventQueue::new();
        let policy = FixedPolicy::new();
        q.enqueue(Box::new(A), EventGroup::root(), info(), &policy);
        let outcome = q.enqueue(Box::new(B), EventGroup::root(), info(), &policy);
        assert!(matches!(outcome, EnqueueOutcome::EventHandlerRunning));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn dequeue_returns_success_in_fifo_order() {
        let q = EventQueue::new();
        let policy = FixedPolicy::new();
        q.enqueue(Box::new(A), EventGroup::root(), info(), &policy);
        q.enqueue(Box::new(B), EventGroup::root(), info(), &policy);
        match q.dequeue(&policy) {
            DequeueOutcome::Success(entry) => assert_eq!(entry.event_type(), EventTypeId::of::<A>()),
            _ => panic!("expected Success"),
        }
        match q.dequeue(&policy) {
            DequeueOutcome::Success(entry) => assert_eq!(entry.event_type(), EventTypeId::of::<B>()),
            _ => panic!("expected Success"),
        }
    }

    #[test]
    fn dequeue_on_empty_queue_clears_running_flag() {
        let q = EventQueue::new();
        let policy = FixedPolicy::new();
        q.enqueue(Box::new(A), EventGroup::root(), info(), &policy);
        q.dequeue(&policy);
        assert!(q.is_handler_running());
        match q.dequeue(&policy) {
            DequeueOutcome::NotAvailable => {}
            _ => panic!("expected NotAvailable"),
        }
        assert!(!q.is_handler_running());
    }

    #[test]
    fn deferred_events_are_skipped_not_removed() {
        let q = EventQueue::new();
        let mut policy = FixedPolicy::new();
        policy.deferred.insert(EventTypeId::of::<A>());
        q.enqueue(Box::new(A), EventGroup::root(), info(), &policy);
        q.enqueue(Box::new(B), EventGroup::root(), info(), &policy);

        match q.dequeue(&policy) {
            DequeueOutcome::Success(entry) => assert_eq!(entry.event_type(), EventTypeId::of::<B>()),
            _ => panic!("expected Success(B), A deferred"),
        }
        assert_eq!(q.len(), 1, "deferred A should remain in the queue");
    }

    #[test]
    fn ignored_events_are_dropped_during_scan() {
        let q = EventQueue::new();
        let mut policy = FixedPolicy::new();
        policy.ignored.insert(EventTypeId::of::<A>());
        q.enqueue(Box::new(A), EventGroup::root(), info(), &policy);
        q.enqueue(Box::new(B), EventGroup::root(), info(), &policy);

        match q.dequeue(&policy) {
            DequeueOutcome::Success(entry) => assert_eq!(entry.event_type(), EventTypeId::of::<B>()),
            _ => panic!("expected Success(B)"),
        }
        assert_eq!(policy.dropped.lock().unwrap().len(), 1);
    }

    #[test]
    fn default_handler_fires_when_fifo_empty() {
        let q = EventQueue::new();
        let mut policy = FixedPolicy::new();
        policy.default_handler = true;
        match q.dequeue(&policy) {
            DequeueOutcome::Default => {}
            _ => panic!("expected Default"),
        }
    }

    #[test]
    fn raised_event_takes_priority_over_fifo() {
        let q = EventQueue::new();
        let policy = FixedPolicy::new();
        q.enqueue(Box::new(B), EventGroup::root(), info(), &policy);
        q.raise(Box::new(A), EventGroup::root(), info()).unwrap();

        match q.dequeue(&policy) {
            DequeueOutcome::Raised(event, _) => {
                assert_eq!(event.event_type(), EventTypeId::of::<A>())
            }
            _ => panic!("expected Raised(A)"),
        }
        match q.dequeue(&policy) {
            DequeueOutcome::Success(entry) => assert_eq!(entry.event_type(), EventTypeId::of::<B>()),
            _ => panic!("expected Success(B) after raised was consumed"),
        }
    }

    #[test]
    fn second_raise_before_consumption_is_an_error() {
        let q = EventQueue::new();
        q.raise(Box::new(A), EventGroup::root(), info()).unwrap();
        let result = q.raise(Box::new(B), EventGroup::root(), info());
        assert!(result.is_err());
    }

    #[test]
    fn enqueue_onto_halted_queue_drops_and_notifies() {
        let q = EventQueue::new();
        let policy = FixedPolicy::new();
        q.close().unwrap();
        let outcome = q.enqueue(Box::new(A), EventGroup::root(), info(), &policy);
        assert!(matches!(outcome, EnqueueOutcome::Dropped));
        assert_eq!(policy.dropped.lock().unwrap().len(), 1);
    }

    #[test]
    fn close_with_pending_receive_is_fatal() {
        let q = EventQueue::new();
        q.register_pending_receive(PendingReceive::new(
            SmallVec::from_vec(vec![EventTypeId::of::<A>()]),
            None,
            Box::new(|_, _, _| {}),
        ));
        assert!(q.close().is_err());
    }

    #[test]
    fn try_receive_now_finds_match_already_queued() {
        let q = EventQueue::new();
        let policy = FixedPolicy::new();
        q.enqueue(Box::new(A), EventGroup::root(), info(), &policy);
        let found = q.try_receive_now(&[EventTypeId::of::<A>()], None);
        assert!(found.is_some());
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn receive_with_predicate_skips_non_matching_and_leaves_it_queued() {
        #[derive(Debug)]
        struct Flag(bool);
        let q = EventQueue::new();
        let policy = FixedPolicy::new();
        q.enqueue(Box::new(Flag(false)), EventGroup::root(), info(), &policy);
        q.enqueue(Box::new(Flag(true)), EventGroup::root(), info(), &policy);

        let predicate = |e: &BoxedEvent| crate::event::downcast_event::<Flag>(e).unwrap().0;
        let found = q
            .try_receive_now(&[EventTypeId::of::<Flag>()], Some(&predicate))
            .expect("should find the true one");
        assert!(crate::event::downcast_event::<Flag>(&found.event).unwrap().0);
        assert_eq!(q.len(), 1, "the false Flag remains queued");
    }

    #[test]
    fn enqueue_matching_pending_receive_bypasses_fifo() {
        let q = EventQueue::new();
        let policy = FixedPolicy::new();
        let delivered = std::sync::Arc::new(Mutex::new(None));
        let delivered2 = delivered.clone();
        q.register_pending_receive(PendingReceive::new(
            SmallVec::from_vec(vec![EventTypeId::of::<A>()]),
            None,
            Box::new(move |event, _group, _info| {
                *delivered2.lock().unwrap() = Some(event.event_type());
            }),
        ));
        let outcome = q.enqueue(Box::new(A), EventGroup::root(), info(), &policy);
        assert!(matches!(outcome, EnqueueOutcome::Received));
        assert_eq!(q.len(), 0);
        assert_eq!(*delivered.lock().unwrap(), Some(EventTypeId::of::<A>()));
    }
}
