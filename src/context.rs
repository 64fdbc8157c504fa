//! The handle every user action, entry action, and initializer is given:
//! [`ActorContext`] is the only way user code ever reaches a runtime
//! operation (send, create-actor, receive, raise, random, monitor). Each is
//! a decision point per specification §5, so `ActorContext` forwards every
//! call straight through to the owning [`Runtime`] rather than doing
//! anything itself.
//!
//! A fresh `ActorContext` is constructed for each dispatched event; it
//! borrows nothing from the entity, so handlers are free to hold it across
//! an `.await` (the one place that matters: [`ActorContext::receive`]).

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::UserError;
use crate::event::{downcast_event, BoxedEvent, Event, EventTypeId};
use crate::id::{ActorId, EventGroup};
use crate::monitor::monitor_type_id;
use crate::runtime::Runtime;

/// Per-dispatch handle to the owning runtime, passed to every action, entry
/// action, exit action, and initializer.
#[derive(Clone)]
pub struct ActorContext {
    runtime: Arc<dyn Runtime>,
    self_id: ActorId,
    group: EventGroup,
    current_state: Option<String>,
}

impl ActorContext {
    pub(crate) fn new(
        runtime: Arc<dyn Runtime>,
        self_id: ActorId,
        group: EventGroup,
        current_state: Option<String>,
    ) -> Self {
        ActorContext {
            runtime,
            self_id,
            group,
            current_state,
        }
    }

    /// This context's owning actor.
    pub fn self_id(&self) -> &ActorId {
        &self.self_id
    }

    /// The causal group of the event currently being handled.
    pub fn current_group(&self) -> EventGroup {
        self.group.clone()
    }

    /// Allocates a brand new, unrelated causal group.
    pub fn create_event_group(&self) -> EventGroup {
        self.runtime.create_event_group()
    }

    /// Creates a new actor from an already-built [`Entity`](crate::actor::Entity),
    /// inheriting this context's current group.
    pub fn create_actor_entity(
        &self,
        name: impl Into<String>,
        entity: Box<dyn crate::actor::Entity>,
        initial_event: Option<Box<dyn Event>>,
    ) -> ActorId {
        self.runtime
            .create_actor(&name.into(), entity, initial_event, self.group.clone())
    }

    /// Sends `event` to `target`, inheriting this context's current group.
    pub fn send<E: Event>(&self, target: &ActorId, event: E) {
        self.send_with_group(target, event, self.group.clone())
    }

    /// Sends `event` to `target` under an explicit group, overriding
    /// inheritance from this context.
    pub fn send_with_group<E: Event>(&self, target: &ActorId, event: E, group: EventGroup) {
        self.runtime.send(
            &self.self_id,
            self.current_state.clone(),
            target,
            Box::new(event),
            group,
        );
    }

    /// Suspends until an event of type `E` arrives, matching it immediately
    /// against the FIFO first (§4.1: "received without waiting").
    pub async fn receive<E: Event + Clone>(&self) -> E {
        self.receive_where::<E, _>(|_| true).await
    }

    /// As [`ActorContext::receive`], but only matches events satisfying
    /// `predicate` (specification §8, Scenario D).
    pub async fn receive_where<E: Event + Clone, F>(&self, predicate: F) -> E
    where
        F: Fn(&E) -> bool + Send + 'static,
    {
        let predicate: Box<dyn Fn(&BoxedEvent) -> bool + Send> =
            Box::new(move |boxed| downcast_event::<E>(boxed).map_or(false, &predicate));
        let entry = self
            .runtime
            .receive(
                &self.self_id,
                SmallVec::from_vec(vec![EventTypeId::of::<E>()]),
                Some(predicate),
            )
            .await;
        *entry
            .event
            .into_any_box()
            .downcast::<E>()
            .expect("receive only ever completes with a type it was asked to await")
    }

    /// Raises `event` on the calling actor's own queue: highest priority,
    /// consumed before the next FIFO dequeue. Fails the action if a raise
    /// is already pending this step (specification §4.1).
    pub fn raise<E: Event>(&self, event: E) -> Result<(), UserError> {
        self.runtime
            .raise(&self.self_id, Box::new(event), self.group.clone())
            .map_err(|_| anyhow::anyhow!("an event is already raised and awaiting consumption"))
    }

    pub(crate) fn current_state(&self) -> Option<&str> {
        self.current_state.as_deref()
    }

    /// A nondeterministic boolean choice, routed through the scheduler under
    /// test and through a real RNG in production.
    pub fn random_bool(&self) -> bool {
        self.runtime.random_bool(&self.self_id)
    }

    /// A nondeterministic integer choice in `[0, bound)`.
    pub fn random_integer(&self, bound: u64) -> u64 {
        self.runtime.random_integer(&self.self_id, bound)
    }

    /// Delivers `event` synchronously to the singleton monitor of type `M`.
    pub fn monitor<M: Send + 'static, E: Event>(&self, event: E) {
        self.runtime
            .monitor_notify(monitor_type_id::<M>(), Box::new(event));
    }

    /// `Assert(cond, msg)`: fails the current action (and, ultimately, the
    /// iteration) if `cond` is false.
    ///
    /// Unlike an ordinary action error, an assertion failure is reported to
    /// the runtime's failure sink directly, right here, rather than being
    /// left to flow back through the action's `Result` and the actor's
    /// `OnException` policy (specification §4.8: assertion failures are
    /// fatal unconditionally, not subject to the exception policy). The
    /// handler loop still recognizes the returned error and halts the actor
    /// without invoking `on_exception` a second time.
    pub fn assert(&self, cond: bool, msg: impl Into<String>) -> Result<(), UserError> {
        if cond {
            return Ok(());
        }
        let message = msg.into();
        self.runtime
            .report_failure(crate::error::WeaveError::AssertionFailure(message.clone()));
        Err(anyhow::anyhow!(crate::error::WeaveError::AssertionFailure(
            message
        )))
    }
}
