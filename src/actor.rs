//! Actors: event-driven entities with a private inbox and a single flat
//! dispatch table.
//!
//! [`Entity`] is the trait the runtime actually drives (object-safe, so a
//! runtime's actor registry can hold a `Box<dyn Entity>` regardless of
//! whether it's a plain actor or a [`StateMachine`](crate::state_machine::StateMachine)).
//! [`TableActor`] is the concrete, table-driven implementation most user
//! actors will use: a builder assembles an `EventTypeId -> handler` map once
//! at registration time, matching §9's guidance that "a table-driven
//! runtime registration is sufficient" and that composition (a builder)
//! should stand in for the deep actor-inheritance hierarchies of the
//! source material.

use std::collections::{HashMap, HashSet};

use futures::future::BoxFuture;

use crate::context::ActorContext;
use crate::error::{ExceptionHandlerResult, UserError};
use crate::event::{BoxedEvent, EventInfo, EventTypeId};
use crate::hooks::{ActorManagerHooks, DropReason};
use crate::id::EventGroup;

/// What a dispatched action asked the handler loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorOutcome {
    /// Keep running; go back to the queue for the next event.
    Continue,
    /// Halt after this action completes (`OnHalt` runs, the queue closes).
    Halt,
}

type HandlerFn<S> = Box<
    dyn Fn(&mut S, BoxedEvent, EventGroup, EventInfo, ActorContext) -> BoxFuture<'static, Result<ActorOutcome, UserError>>
        + Send
        + Sync,
>;

/// A flat `event type -> handler` table for a [`TableActor`]'s state `S`.
///
/// Built once via [`DispatchTableBuilder`] and shared (read-only) across the
/// actor's lifetime; dispatch is a single hash lookup.
pub struct DispatchTable<S> {
    handlers: HashMap<EventTypeId, HandlerFn<S>>,
    default: Option<HandlerFn<S>>,
    ignored: HashSet<EventTypeId>,
    deferred: HashSet<EventTypeId>,
}

impl<S> DispatchTable<S> {
    pub fn builder() -> DispatchTableBuilder<S> {
        DispatchTableBuilder {
            handlers: HashMap::new(),
            default: None,
            ignored: HashSet::new(),
            deferred: HashSet::new(),
        }
    }
}

/// Accumulates dispatch-table entries before an actor is constructed.
pub struct DispatchTableBuilder<S> {
    handlers: HashMap<EventTypeId, HandlerFn<S>>,
    default: Option<HandlerFn<S>>,
    ignored: HashSet<EventTypeId>,
    deferred: HashSet<EventTypeId>,
}

impl<S: Send + 'static> DispatchTableBuilder<S> {
    /// Registers a handler for event type `E`. The last registration for a
    /// given type wins, mirroring "derived entries win" from §9's merge
    /// rule for composed dispatch tables.
    pub fn on<E, F, Fut>(mut self, handler: F) -> Self
    where
        E: crate::event::Event,
        F: Fn(&mut S, E, EventGroup, ActorContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ActorOutcome, UserError>> + Send + 'static,
    {
        let boxed: HandlerFn<S> = Box::new(move |state, event, group, _info, ctx| {
            let typed = *event
                .into_any_box()
                .downcast::<E>()
                .expect("event type matched the dispatch table key");
            Box::pin(handler(state, typed, group, ctx))
        });
        self.handlers.insert(EventTypeId::of::<E>(), boxed);
        self
    }

    /// Registers a default handler, invoked when the queue synthesizes a
    /// `DefaultEvent` because the FIFO is empty or fully deferred.
    pub fn on_default<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(&mut S, ActorContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ActorOutcome, UserError>> + Send + 'static,
    {
        let boxed: HandlerFn<S> = Box::new(move |state, _event, _group, _info, ctx| {
            Box::pin(handler(state, ctx))
        });
        self.default = Some(boxed);
        self
    }

    /// Marks event type `E` as ignored: dequeued and dropped without ever
    /// reaching a handler.
    pub fn ignore<E: crate::event::Event>(mut self) -> Self {
        self.ignored.insert(EventTypeId::of::<E>());
        self
    }

    /// Marks event type `E` as deferred: left in the FIFO for a later state
    /// of this same actor to handle. (For a flat [`TableActor`] this simply
    /// postpones it until the set of deferred types changes, which only a
    /// state machine's transitions can do — a plain actor would need to
    /// drop deferral itself before the event becomes reachable again.)
    pub fn defer<E: crate::event::Event>(mut self) -> Self {
        self.deferred.insert(EventTypeId::of::<E>());
        self
    }

    pub fn build(self) -> DispatchTable<S> {
        DispatchTable {
            handlers: self.handlers,
            default: self.default,
            ignored: self.ignored,
            deferred: self.deferred,
        }
    }
}

/// The trait the runtime drives: object-safe, so actors and state machines
/// of different concrete types can share one registry.
#[async_trait::async_trait]
pub trait Entity: Send {
    /// Runs once at creation, before the handler loop starts. May enqueue
    /// sends or create actors (via `ctx`) but must not call `receive`.
    async fn on_initialize(
        &mut self,
        initial_event: Option<BoxedEvent>,
        ctx: ActorContext,
    ) -> Result<(), UserError>;

    /// Runs exactly once, when the entity halts.
    async fn on_halt(&mut self, ctx: ActorContext);

    /// Dispatches one event, already removed from the queue by the handler
    /// loop (it may be a real FIFO/raised event or a synthetic default).
    async fn dispatch(
        &mut self,
        event: BoxedEvent,
        group: EventGroup,
        info: EventInfo,
        ctx: ActorContext,
    ) -> Result<ActorOutcome, UserError>;

    /// Whether a handler exists for `event_type` (including any default
    /// handler, for the purposes of the "unhandled event" check — the
    /// handler loop still prefers an exact match before falling back).
    fn has_handler(&self, event_type: EventTypeId) -> bool;

    fn is_ignored(&self, event_type: EventTypeId) -> bool;
    fn is_deferred(&self, event_type: EventTypeId) -> bool;
    fn has_default_handler(&self) -> bool;

    /// The name of the currently active hierarchical state, for entities
    /// that have one. Flat actors (no state stack) leave this `None`;
    /// [`StateMachine`](crate::state_machine::StateMachine) reports its top
    /// of stack.
    fn current_state_name(&self) -> Option<String> {
        None
    }

    /// Decides the fate of an exception thrown from a dispatched action.
    fn on_exception(&mut self, error: &UserError) -> ExceptionHandlerResult {
        let _ = error;
        ExceptionHandlerResult::ThrowException
    }
}

/// An [`ActorManagerHooks`] view over any [`Entity`], used by the per-actor
/// [`EventQueue`](crate::queue::EventQueue) to decide ignore/defer/default
/// without knowing the entity's concrete type.
pub struct EntityHooks<'a>(pub &'a dyn Entity);

impl<'a> ActorManagerHooks for EntityHooks<'a> {
    fn is_ignored(&self, event_type: EventTypeId) -> bool {
        self.0.is_ignored(event_type)
    }

    fn is_deferred(&self, event_type: EventTypeId) -> bool {
        self.0.is_deferred(event_type)
    }

    fn has_default_handler(&self) -> bool {
        self.0.has_default_handler()
    }

    fn on_event_dropped(&self, event_type: EventTypeId, reason: DropReason) {
        tracing::debug!(?event_type, ?reason, "event dropped");
    }
}

/// A plain, flat-dispatch actor built from a [`DispatchTable`] over user
/// state `S`.
pub struct TableActor<S> {
    pub state: S,
    table: DispatchTable<S>,
    on_initialize: Option<
        Box<
            dyn Fn(&mut S, Option<BoxedEvent>, ActorContext) -> BoxFuture<'static, Result<(), UserError>>
                + Send
                + Sync,
        >,
    >,
    on_halt: Option<Box<dyn Fn(&mut S, ActorContext) -> BoxFuture<'static, ()> + Send + Sync>>,
    on_exception: Box<dyn Fn(&mut S, &UserError) -> ExceptionHandlerResult + Send + Sync>,
}

impl<S: Send + 'static> TableActor<S> {
    pub fn new(state: S, table: DispatchTable<S>) -> Self {
        TableActor {
            state,
            table,
            on_initialize: None,
            on_halt: None,
            on_exception: Box::new(|_, _| ExceptionHandlerResult::ThrowException),
        }
    }

    pub fn with_initialize<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&mut S, Option<BoxedEvent>, ActorContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), UserError>> + Send + 'static,
    {
        self.on_initialize = Some(Box::new(move |s, e, ctx| Box::pin(f(s, e, ctx))));
        self
    }

    pub fn with_halt<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&mut S, ActorContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.on_halt = Some(Box::new(move |s, ctx| Box::pin(f(s, ctx))));
        self
    }

    pub fn with_exception_policy<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut S, &UserError) -> ExceptionHandlerResult + Send + Sync + 'static,
    {
        self.on_exception = Box::new(f);
        self
    }
}

#[async_trait::async_trait]
impl<S: Send + 'static> Entity for TableActor<S> {
    async fn on_initialize(
        &mut self,
        initial_event: Option<BoxedEvent>,
        ctx: ActorContext,
    ) -> Result<(), UserError> {
        if let Some(hook) = &self.on_initialize {
            hook(&mut self.state, initial_event, ctx).await
        } else {
            Ok(())
        }
    }

    async fn on_halt(&mut self, ctx: ActorContext) {
        if let Some(hook) = &self.on_halt {
            hook(&mut self.state, ctx).await
        }
    }

    async fn dispatch(
        &mut self,
        event: BoxedEvent,
        group: EventGroup,
        info: EventInfo,
        ctx: ActorContext,
    ) -> Result<ActorOutcome, UserError> {
        let event_type = event.event_type();
        if let Some(handler) = self.table.handlers.get(&event_type) {
            return handler(&mut self.state, event, group, info, ctx).await;
        }
        if let Some(default) = &self.table.default {
            return default(&mut self.state, event, group, info, ctx).await;
        }
        Err(anyhow::anyhow!(
            "no handler registered for event type; this should have been caught by has_handler"
        ))
    }

    fn has_handler(&self, event_type: EventTypeId) -> bool {
        self.table.handlers.contains_key(&event_type) || self.table.default.is_some()
    }

    fn is_ignored(&self, event_type: EventTypeId) -> bool {
        self.table.ignored.contains(&event_type)
    }

    fn is_deferred(&self, event_type: EventTypeId) -> bool {
        self.table.deferred.contains(&event_type)
    }

    fn has_default_handler(&self) -> bool {
        self.table.default.is_some()
    }

    fn on_exception(&mut self, error: &UserError) -> ExceptionHandlerResult {
        (self.on_exception)(&mut self.state, error)
    }
}
