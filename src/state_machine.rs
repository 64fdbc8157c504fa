//! State machines: actors whose dispatch depends on a stack of hierarchical
//! states, per specification §4.3.
//!
//! [`StateMachine<S>`] plays the same builder/table role
//! [`TableActor`](crate::actor::TableActor) plays for flat actors — a
//! [`StateMachineBuilder`] accumulates named states, each with its own
//! entry/exit actions and dispatch table, before the machine starts — but
//! adds the stack and `goto`/`push`/`pop` transitions that aren't
//! observable in a flat actor at all.

use std::collections::{HashMap, HashSet};

use futures::future::BoxFuture;

use crate::actor::{ActorOutcome, Entity};
use crate::context::ActorContext;
use crate::error::{ExceptionHandlerResult, UserError};
use crate::event::{BoxedEvent, Event, EventInfo, EventTypeId};
use crate::id::EventGroup;

/// What a dispatched action on a [`StateMachine`] asked the machine to do
/// once the action itself completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Stay in the current state.
    Continue,
    /// Run the current top's exit action, replace it with `to`, run `to`'s
    /// entry action.
    Goto(&'static str),
    /// Push `to` on top of the stack and run its entry action. The prior
    /// top's exit action does not run.
    Push(&'static str),
    /// Run the current top's exit action and pop it. If the stack becomes
    /// empty, the machine halts.
    Pop,
    /// Halt the machine once this action (and any transition above)
    /// completes.
    Halt,
}

type ActionFn<S> = Box<
    dyn Fn(&mut S, BoxedEvent, EventGroup, EventInfo, ActorContext) -> BoxFuture<'static, Result<Transition, UserError>>
        + Send
        + Sync,
>;
type LifecycleFn<S> = Box<dyn Fn(&mut S, &ActorContext) + Send + Sync>;

struct StateDef<S> {
    entry: Option<LifecycleFn<S>>,
    exit: Option<LifecycleFn<S>>,
    handlers: HashMap<EventTypeId, ActionFn<S>>,
    wildcard: Option<ActionFn<S>>,
    default: Option<ActionFn<S>>,
    ignored: HashSet<EventTypeId>,
    deferred: HashSet<EventTypeId>,
}

/// Accumulates one state's entry/exit actions, dispatch table, and
/// ignore/defer policy before the owning [`StateMachineBuilder`] is built.
pub struct StateBuilder<S> {
    entry: Option<LifecycleFn<S>>,
    exit: Option<LifecycleFn<S>>,
    handlers: HashMap<EventTypeId, ActionFn<S>>,
    wildcard: Option<ActionFn<S>>,
    default: Option<ActionFn<S>>,
    ignored: HashSet<EventTypeId>,
    deferred: HashSet<EventTypeId>,
}

impl<S: Send + 'static> StateBuilder<S> {
    fn new() -> Self {
        StateBuilder {
            entry: None,
            exit: None,
            handlers: HashMap::new(),
            wildcard: None,
            default: None,
            ignored: HashSet::new(),
            deferred: HashSet::new(),
        }
    }

    pub fn on_entry<F: Fn(&mut S, &ActorContext) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.entry = Some(Box::new(f));
        self
    }

    pub fn on_exit<F: Fn(&mut S, &ActorContext) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.exit = Some(Box::new(f));
        self
    }

    /// Registers an action for event type `E`. The action returns a
    /// [`Transition`] describing what the machine should do once it
    /// finishes; raising a separate event is done through
    /// [`ActorContext::raise`] and is independent of this return value.
    pub fn on<E, F, Fut>(mut self, handler: F) -> Self
    where
        E: Event,
        F: Fn(&mut S, E, EventGroup, ActorContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Transition, UserError>> + Send + 'static,
    {
        let boxed: ActionFn<S> = Box::new(move |state, event, group, _info, ctx| {
            let typed = *event
                .into_any_box()
                .downcast::<E>()
                .expect("event type matched the dispatch table key");
            Box::pin(handler(state, typed, group, ctx))
        });
        self.handlers.insert(EventTypeId::of::<E>(), boxed);
        self
    }

    /// Registers a handler matching any event type not otherwise matched in
    /// this state (`WildCardEvent` from specification §3).
    pub fn on_wildcard<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(&mut S, BoxedEvent, EventGroup, ActorContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Transition, UserError>> + Send + 'static,
    {
        let boxed: ActionFn<S> = Box::new(move |state, event, group, _info, ctx| {
            Box::pin(handler(state, event, group, ctx))
        });
        self.wildcard = Some(boxed);
        self
    }

    /// Registers a default handler, run when the queue synthesizes a
    /// `DefaultEvent` because the FIFO is empty or fully deferred in this
    /// state.
    pub fn on_default<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(&mut S, ActorContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Transition, UserError>> + Send + 'static,
    {
        let boxed: ActionFn<S> =
            Box::new(move |state, _event, _group, _info, ctx| Box::pin(handler(state, ctx)));
        self.default = Some(boxed);
        self
    }

    /// Marks `E` ignored in this state: dequeued and dropped without ever
    /// reaching an action.
    pub fn ignore<E: Event>(mut self) -> Self {
        self.ignored.insert(EventTypeId::of::<E>());
        self
    }

    /// Marks `E` deferred in this state: left in the FIFO until a
    /// transition out of this state removes the deferral.
    pub fn defer<E: Event>(mut self) -> Self {
        self.deferred.insert(EventTypeId::of::<E>());
        self
    }

    fn build(self) -> StateDef<S> {
        StateDef {
            entry: self.entry,
            exit: self.exit,
            handlers: self.handlers,
            wildcard: self.wildcard,
            default: self.default,
            ignored: self.ignored,
            deferred: self.deferred,
        }
    }
}

/// Accumulates a state machine's named states before construction.
pub struct StateMachineBuilder<S> {
    states: HashMap<&'static str, StateDef<S>>,
    on_halt: Option<Box<dyn Fn(&mut S, &ActorContext) -> BoxFuture<'static, ()> + Send + Sync>>,
    on_exception: Box<dyn Fn(&mut S, &UserError) -> ExceptionHandlerResult + Send + Sync>,
}

impl<S: Send + 'static> StateMachineBuilder<S> {
    pub fn new() -> Self {
        StateMachineBuilder {
            states: HashMap::new(),
            on_halt: None,
            on_exception: Box::new(|_, _| ExceptionHandlerResult::ThrowException),
        }
    }

    /// Declares state `name`, built by `build`.
    pub fn state(
        mut self,
        name: &'static str,
        build: impl FnOnce(StateBuilder<S>) -> StateBuilder<S>,
    ) -> Self {
        let def = build(StateBuilder::new()).build();
        self.states.insert(name, def);
        self
    }

    pub fn with_halt<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&mut S, ActorContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.on_halt = Some(Box::new(move |s, ctx| Box::pin(f(s, ctx.clone()))));
        self
    }

    pub fn with_exception_policy<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut S, &UserError) -> ExceptionHandlerResult + Send + Sync + 'static,
    {
        self.on_exception = Box::new(f);
        self
    }

    /// Builds the machine. `start_state` becomes the sole entry of the
    /// initial stack; its entry action (if any) is run from
    /// [`Entity::on_initialize`], not here, so it can observe
    /// `initial_event`.
    pub fn build(self, start_state: &'static str, initial: S) -> StateMachine<S> {
        assert!(
            self.states.contains_key(start_state),
            "start state '{}' was never declared",
            start_state
        );
        StateMachine {
            state: initial,
            states: self.states,
            stack: Vec::new(),
            start_state,
            on_halt: self.on_halt,
            on_exception: self.on_exception,
        }
    }
}

/// An actor whose dispatch depends on a stack of hierarchical states. See
/// the module documentation and specification §4.3.
pub struct StateMachine<S> {
    pub state: S,
    states: HashMap<&'static str, StateDef<S>>,
    stack: Vec<&'static str>,
    start_state: &'static str,
    on_halt: Option<Box<dyn Fn(&mut S, &ActorContext) -> BoxFuture<'static, ()> + Send + Sync>>,
    on_exception: Box<dyn Fn(&mut S, &UserError) -> ExceptionHandlerResult + Send + Sync>,
}

impl<S: Send + 'static> StateMachine<S> {
    pub fn builder() -> StateMachineBuilder<S> {
        StateMachineBuilder::new()
    }

    /// The name of the currently active (topmost) state.
    pub fn current_state(&self) -> &'static str {
        self.stack.last().copied().unwrap_or(self.start_state)
    }

    fn top_def(&self) -> &StateDef<S> {
        &self.states[self.current_state()]
    }

    /// Looks up the handler for `event_type`, walking the stack from the
    /// top down, per §4.3: "returning the first state that has a handler
    /// for the event type (including `WildCardEvent`)."
    fn find_handler(&self, event_type: EventTypeId) -> bool {
        self.stack
            .iter()
            .rev()
            .any(|name| {
                let def = &self.states[name];
                def.handlers.contains_key(&event_type) || def.wildcard.is_some()
            })
    }

    fn run_entry(&mut self, name: &'static str, ctx: &ActorContext) {
        if let Some(entry) = self.states.get(name).and_then(|d| d.entry.as_ref()) {
            entry(&mut self.state, ctx);
        }
    }

    fn run_exit(&mut self, name: &'static str, ctx: &ActorContext) {
        if let Some(exit) = self.states.get(name).and_then(|d| d.exit.as_ref()) {
            exit(&mut self.state, ctx);
        }
    }

    async fn apply_transition(&mut self, transition: Transition, ctx: &ActorContext) -> ActorOutcome {
        match transition {
            Transition::Continue => ActorOutcome::Continue,
            Transition::Goto(to) => {
                assert!(self.states.contains_key(to), "goto to undeclared state '{}'", to);
                let from = self.current_state();
                self.run_exit(from, ctx);
                if self.stack.is_empty() {
                    self.stack.push(to);
                } else {
                    *self.stack.last_mut().unwrap() = to;
                }
                self.run_entry(to, ctx);
                ActorOutcome::Continue
            }
            Transition::Push(to) => {
                assert!(self.states.contains_key(to), "push to undeclared state '{}'", to);
                self.stack.push(to);
                self.run_entry(to, ctx);
                ActorOutcome::Continue
            }
            Transition::Pop => {
                let from = self.current_state();
                self.run_exit(from, ctx);
                self.stack.pop();
                if self.stack.is_empty() {
                    ActorOutcome::Halt
                } else {
                    ActorOutcome::Continue
                }
            }
            Transition::Halt => ActorOutcome::Halt,
        }
    }
}

#[async_trait::async_trait]
impl<S: Send + 'static> Entity for StateMachine<S> {
    async fn on_initialize(
        &mut self,
        initial_event: Option<BoxedEvent>,
        ctx: ActorContext,
    ) -> Result<(), UserError> {
        let _ = initial_event;
        self.stack.push(self.start_state);
        self.run_entry(self.start_state, &ctx);
        Ok(())
    }

    async fn on_halt(&mut self, ctx: ActorContext) {
        if let Some(hook) = &self.on_halt {
            hook(&mut self.state, &ctx).await
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
        let owning_state = self
            .stack
            .iter()
            .rev()
            .find(|name| {
                let def = &self.states[*name];
                def.handlers.contains_key(&event_type) || def.wildcard.is_some()
            })
            .copied();

        let transition = if let Some(name) = owning_state {
            let def = self.states.get(name).unwrap();
            if let Some(handler) = def.handlers.get(&event_type) {
                handler(&mut self.state, event, group, info, ctx.clone()).await?
            } else {
                let wildcard = def.wildcard.as_ref().unwrap();
                wildcard(&mut self.state, event, group, info, ctx.clone()).await?
            }
        } else if let Some(default) = self.top_def().default.as_ref() {
            default(&mut self.state, event, group, info, ctx.clone()).await?
        } else {
            return Err(anyhow::anyhow!(
                "no handler registered for event type; this should have been caught by has_handler"
            ));
        };

        Ok(self.apply_transition(transition, &ctx).await)
    }

    fn has_handler(&self, event_type: EventTypeId) -> bool {
        self.find_handler(event_type) || self.top_def().default.is_some()
    }

    fn is_ignored(&self, event_type: EventTypeId) -> bool {
        self.top_def().ignored.contains(&event_type)
    }

    fn is_deferred(&self, event_type: EventTypeId) -> bool {
        self.top_def().deferred.contains(&event_type)
    }

    fn has_default_handler(&self) -> bool {
        self.top_def().default.is_some()
    }

    fn current_state_name(&self) -> Option<String> {
        Some(self.current_state().to_string())
    }

    fn on_exception(&mut self, error: &UserError) -> ExceptionHandlerResult {
        (self.on_exception)(&mut self.state, error)
    }
}
