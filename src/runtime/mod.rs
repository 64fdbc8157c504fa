//! The runtime abstraction (specification §4.5): factory, lifecycle, event
//! routing, random choices, and failure delivery, object-safe over one
//! shared [`Runtime`] trait so [`ActorContext`](crate::context::ActorContext)
//! never has to know whether it's running under the [`controlled`] testing
//! runtime or the [`production`] one.
//!
//! Both implementations share the same actor bookkeeping shape (a registry
//! of `ActorId -> (EventQueue, Entity)`); they differ only in *how* a
//! handler task is scheduled to run once a queue goes from empty to
//! non-empty, which is exactly the seam §5 calls out as the one thing
//! testing controls and production doesn't.

pub mod controlled;
pub mod production;

use std::any::TypeId;
use std::sync::Arc;

use async_trait::async_trait;
use smallvec::SmallVec;

use crate::actor::Entity;
use crate::error::WeaveError;
use crate::event::{BoxedEvent, EventTypeId, InboxEntry};
use crate::id::{ActorId, EventGroup};
use crate::monitor::MonitorEntity;
use crate::queue::RaiseAlreadyPending;

pub use controlled::ControlledRuntime;
pub use production::ProductionRuntime;

/// A predicate narrowing a `receive` beyond its set of awaited event types.
pub type ReceivePredicate = Box<dyn Fn(&BoxedEvent) -> bool + Send>;

/// The operations every [`ActorContext`](crate::context::ActorContext) call
/// forwards to. Implemented by [`ControlledRuntime`] (scheduler-driven,
/// deterministic, used under test) and [`ProductionRuntime`] (tokio
/// multi-threaded executor, used to actually run a system).
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Instantiates an entity, runs its `on_initialize`, and returns its new
    /// id. Spec §4.5: "Initialization may enqueue sends but must not block
    /// on a receive."
    fn create_actor(
        &self,
        name: &str,
        entity: Box<dyn Entity>,
        initial_event: Option<BoxedEvent>,
        group: EventGroup,
    ) -> ActorId;

    /// Routes `event` into `target`'s queue, starting a handler task if none
    /// was running.
    fn send(
        &self,
        sender: &ActorId,
        sender_state: Option<String>,
        target: &ActorId,
        event: BoxedEvent,
        group: EventGroup,
    );

    /// Suspends `actor` until a matching event is available, per §4.1's
    /// `ReceiveEventAsync`.
    async fn receive(
        &self,
        actor: &ActorId,
        awaited: SmallVec<[EventTypeId; 4]>,
        predicate: Option<ReceivePredicate>,
    ) -> InboxEntry;

    /// Places `event` into `actor`'s single-slot raise buffer.
    fn raise(
        &self,
        actor: &ActorId,
        event: BoxedEvent,
        group: EventGroup,
    ) -> Result<(), RaiseAlreadyPending>;

    /// A nondeterministic boolean choice attributed to `actor` for trace
    /// purposes.
    fn random_bool(&self, actor: &ActorId) -> bool;

    /// A nondeterministic integer choice in `[0, bound)`.
    fn random_integer(&self, actor: &ActorId, bound: u64) -> u64;

    /// Installs (or replaces) the singleton monitor keyed by `type_id`.
    fn register_monitor(&self, type_id: TypeId, monitor: Box<dyn MonitorEntity>);

    /// Delivers `event` synchronously to the monitor keyed by `type_id`, if
    /// one is registered.
    fn monitor_notify(&self, type_id: TypeId, event: BoxedEvent);

    /// Allocates a fresh, unrelated causal group.
    fn create_event_group(&self) -> EventGroup;

    /// The failure channel from §4.5/§4.8 (`OnFailure`).
    fn report_failure(&self, error: WeaveError);
}

/// Convenience extension adding the generic, type-erasing wrappers around
/// [`Runtime`]'s object-safe primitives — kept off the trait itself so
/// `Runtime` stays `dyn`-safe.
pub trait RuntimeExt: Runtime + Sized {
    /// Registers `monitor` as the singleton observer for state type `M`.
    fn register_monitor_typed<M: Send + 'static>(
        self: &Arc<Self>,
        monitor: crate::monitor::Monitor<M>,
    ) {
        self.register_monitor(crate::monitor::monitor_type_id::<M>(), Box::new(monitor));
    }
}

impl<R: Runtime> RuntimeExt for R {}
