//! The event model: opaque, type-tagged messages and the metadata recorded
//! alongside them in a queue.
//!
//! Per the design notes in the specification, dynamic casting of events
//! (`e as T` in the source material) is re-architected here as a type tag
//! (`EventTypeId`, backed by [`std::any::TypeId`]) plus `Any`-based
//! downcasting — no reflection, no attribute-driven dispatch.

use std::any::{Any, TypeId};
use std::fmt::Debug;

use crate::id::{ActorId, EventGroup};

/// A type-erased tag identifying an event's concrete Rust type.
///
/// Dispatch tables are keyed by this tag rather than by the event value
/// itself, since two events of the same type must hit the same handler
/// regardless of their payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct EventTypeId(TypeId);

impl EventTypeId {
    /// The type tag for `E`.
    pub fn of<E: Event>() -> Self {
        EventTypeId(TypeId::of::<E>())
    }
}

/// An opaque, user-supplied message value carrying a type tag used for
/// dispatch. Events are immutable once sent: nothing in this crate ever
/// hands out `&mut` access to a value already enqueued.
pub trait Event: Any + Debug + Send + Sync {
    /// The type tag dispatch tables key on. Has a universal default so user
    /// types never need to implement this by hand.
    fn event_type(&self) -> EventTypeId {
        EventTypeId(TypeId::of::<Self>())
    }

    /// Upcast to `&dyn Any` for downcasting against a concrete type in a
    /// `receive` predicate or handler.
    fn as_any(&self) -> &dyn Any;

    /// Consumes the box, upcasting to `Box<dyn Any>` so a dispatch table can
    /// downcast a matched event back to its concrete type.
    fn into_any_box(self: Box<Self>) -> Box<dyn Any>;

    /// The concrete Rust type name, used only to render
    /// [`WeaveError::UnhandledEvent`](crate::error::WeaveError::UnhandledEvent)
    /// messages — never used for dispatch.
    fn event_type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<E: Any + Debug + Send + Sync> Event for E {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_box(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A boxed, type-erased event value as it travels through a queue.
pub type BoxedEvent = Box<dyn Event>;

/// Attempts to downcast a boxed event to a concrete type `E`.
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    event.as_any().downcast_ref::<E>()
}

/// Built-in event requesting that an actor or state machine halt.
///
/// Delivered like any other event: an actor's dispatch table may install a
/// handler for it, but if none is installed the default behavior (run
/// `OnHalt`, close the queue) still applies once it reaches the front of the
/// queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaltEvent;

/// A sentinel type tag matching any event not otherwise matched by a more
/// specific dispatch-table entry.
///
/// `WildCardEvent` never appears as a concrete enqueued value — it is only
/// ever used as a dispatch-table *key*. [`EventTypeId::of::<WildCardEvent>()`]
/// is reserved and must not collide with a real event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WildCardEvent;

/// Synthetic event type emitted by a queue's `Dequeue` when the FIFO is
/// empty (or fully deferred) and a default handler is installed for the
/// current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultEvent;

/// Metadata recorded once per enqueued event: where it came from, under
/// which state, as part of which causal group, and its position in the
/// sender's send order.
#[derive(Debug, Clone)]
pub struct EventInfo {
    /// The actor that performed the send.
    pub origin_actor: ActorId,
    /// The name of the state the origin actor was in when it sent, if any
    /// (actors with no hierarchical state leave this `None`).
    pub origin_state: Option<String>,
    /// The causal group the send inherited or was given.
    pub origin_group: EventGroup,
    /// Monotonic per-sender sequence number, used to prove the FIFO-per-sender
    /// ordering guarantee under test.
    pub send_sequence: u64,
}

impl EventInfo {
    pub fn new(
        origin_actor: ActorId,
        origin_state: Option<String>,
        origin_group: EventGroup,
        send_sequence: u64,
    ) -> Self {
        EventInfo {
            origin_actor,
            origin_state,
            origin_group,
            send_sequence,
        }
    }
}

/// One entry sitting in a per-actor inbox: the event itself, the group it
/// carries, and the metadata recorded at enqueue time.
#[derive(Debug)]
pub struct InboxEntry {
    pub event: BoxedEvent,
    pub group: EventGroup,
    pub info: EventInfo,
}

impl InboxEntry {
    pub fn new(event: BoxedEvent, group: EventGroup, info: EventInfo) -> Self {
        InboxEntry { event, group, info }
    }

    pub fn event_type(&self) -> EventTypeId {
        self.event.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Ping(u32);

    #[derive(Debug)]
    struct Pong;

    #[test]
    fn distinct_event_types_have_distinct_tags() {
        assert_ne!(EventTypeId::of::<Ping>(), EventTypeId::of::<Pong>());
    }

    #[test]
    fn same_event_type_shares_tag_regardless_of_payload() {
        let a: BoxedEvent = Box::new(Ping(1));
        let b: BoxedEvent = Box::new(Ping(2));
        assert_eq!(a.event_type(), b.event_type());
    }

    #[test]
    fn downcast_recovers_payload() {
        let boxed: BoxedEvent = Box::new(Ping(42));
        let ping = downcast_event::<Ping>(&boxed).expect("downcast should succeed");
        assert_eq!(ping.0, 42);
    }

    #[test]
    fn downcast_to_wrong_type_fails() {
        let boxed: BoxedEvent = Box::new(Ping(42));
        assert!(downcast_event::<Pong>(&boxed).is_none());
    }
}
