//! Specification monitors: single, non-concurrent state machines observing
//! synchronous notifications and classifying each state as cold
//! (liveness-safe) or hot (liveness-unsafe).
//!
//! A monitor shares the state-stack-free half of
//! [`StateMachine`](crate::state_machine)'s dispatch rules (§4.4: "the same
//! lookup rules as a state machine (minus push/pop)") but never suspends:
//! notifications are plain synchronous calls from the invoking actor's
//! handler, so monitor handlers take `&mut M` directly rather than
//! returning a future.

use std::any::TypeId;
use std::collections::HashMap;

use crate::error::UserError;
use crate::event::{BoxedEvent, EventTypeId};

/// Liveness classification of a monitor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temperature {
    /// Safe to stay in indefinitely.
    Cold,
    /// Carries a progress obligation — staying here too long under a fair
    /// schedule is a liveness bug.
    Hot,
}

/// What a monitor action asked for.
pub enum MonitorOutcome {
    /// Stay in the current state.
    Stay,
    /// Transition to the named state (entry/exit actions run as usual).
    Goto(String),
}

type MonitorHandlerFn<M> =
    Box<dyn Fn(&mut M, &BoxedEvent) -> Result<MonitorOutcome, UserError> + Send + Sync>;
type MonitorActionFn<M> = Box<dyn Fn(&mut M) + Send + Sync>;

struct MonitorState<M> {
    temperature: Temperature,
    entry: Option<MonitorActionFn<M>>,
    exit: Option<MonitorActionFn<M>>,
    handlers: HashMap<EventTypeId, MonitorHandlerFn<M>>,
    wildcard: Option<MonitorHandlerFn<M>>,
}

/// Accumulates a monitor's states before construction.
pub struct MonitorBuilder<M> {
    states: HashMap<String, MonitorState<M>>,
}

impl<M: Send + 'static> MonitorBuilder<M> {
    pub fn new() -> Self {
        MonitorBuilder {
            states: HashMap::new(),
        }
    }

    pub fn state(mut self, name: impl Into<String>, build: impl FnOnce(MonitorStateBuilder<M>) -> MonitorStateBuilder<M>) -> Self {
        let built = build(MonitorStateBuilder::new()).finish();
        self.states.insert(name.into(), built);
        self
    }

    pub fn build(self, start_state: impl Into<String>, initial: M) -> Monitor<M> {
        let start = start_state.into();
        assert!(
            self.states.contains_key(&start),
            "monitor start state must be one of the registered states"
        );
        Monitor {
            state: initial,
            states: self.states,
            current: start,
            hot_streak: 0,
        }
    }
}

/// Accumulates one state's entry/exit actions and dispatch table.
pub struct MonitorStateBuilder<M> {
    temperature: Temperature,
    entry: Option<MonitorActionFn<M>>,
    exit: Option<MonitorActionFn<M>>,
    handlers: HashMap<EventTypeId, MonitorHandlerFn<M>>,
    wildcard: Option<MonitorHandlerFn<M>>,
}

impl<M: Send + 'static> MonitorStateBuilder<M> {
    fn new() -> Self {
        MonitorStateBuilder {
            temperature: Temperature::Cold,
            entry: None,
            exit: None,
            handlers: HashMap::new(),
            wildcard: None,
        }
    }

    pub fn hot(mut self) -> Self {
        self.temperature = Temperature::Hot;
        self
    }

    pub fn on_entry<F: Fn(&mut M) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.entry = Some(Box::new(f));
        self
    }

    pub fn on_exit<F: Fn(&mut M) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.exit = Some(Box::new(f));
        self
    }

    pub fn on<E, F>(mut self, handler: F) -> Self
    where
        E: crate::event::Event,
        F: Fn(&mut M, &E) -> Result<MonitorOutcome, UserError> + Send + Sync + 'static,
    {
        self.handlers.insert(
            EventTypeId::of::<E>(),
            Box::new(move |state, event| {
                let typed = crate::event::downcast_event::<E>(event)
                    .expect("event type matched the monitor dispatch table key");
                handler(state, typed)
            }),
        );
        self
    }

    pub fn on_wildcard<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut M, &BoxedEvent) -> Result<MonitorOutcome, UserError> + Send + Sync + 'static,
    {
        self.wildcard = Some(Box::new(handler));
        self
    }

    fn finish(self) -> MonitorState<M> {
        MonitorState {
            temperature: self.temperature,
            entry: self.entry,
            exit: self.exit,
            handlers: self.handlers,
            wildcard: self.wildcard,
        }
    }
}

/// A single-state-machine observer. See the module documentation and
/// specification §4.4.
pub struct Monitor<M> {
    state: M,
    states: HashMap<String, MonitorState<M>>,
    current: String,
    /// Consecutive scheduled steps this monitor has spent continuously in a
    /// hot state, tracked by the testing engine via [`Monitor::note_step`].
    hot_streak: u32,
}

impl<M: Send + 'static> Monitor<M> {
    pub fn builder() -> MonitorBuilder<M> {
        MonitorBuilder::new()
    }

    pub fn current_state(&self) -> &str {
        &self.current
    }

    pub fn temperature(&self) -> Temperature {
        self.states[&self.current].temperature
    }

    pub fn is_hot(&self) -> bool {
        matches!(self.temperature(), Temperature::Hot)
    }

    /// Delivers `event` synchronously, running any resulting transition.
    pub fn notify(&mut self, event: BoxedEvent) -> Result<(), UserError> {
        let event_type = event.event_type();
        let outcome = {
            let state = self
                .states
                .get(&self.current)
                .expect("current state always exists");
            if let Some(handler) = state.handlers.get(&event_type) {
                handler(&mut self.state, &event)?
            } else if let Some(wildcard) = &state.wildcard {
                wildcard(&mut self.state, &event)?
            } else {
                return Ok(());
            }
        };

        if let MonitorOutcome::Goto(next) = outcome {
            assert!(
                self.states.contains_key(&next),
                "monitor transitioned to an unregistered state '{}'",
                next
            );
            if let Some(exit) = &self.states[&self.current].exit {
                exit(&mut self.state);
            }
            self.current = next;
            if let Some(entry) = &self.states[&self.current].entry {
                entry(&mut self.state);
            }
        }
        Ok(())
    }

    /// Called once per scheduled step by the testing engine's liveness
    /// check; returns `true` if the hot streak just reached `threshold`.
    pub fn note_step(&mut self, threshold: u32) -> bool {
        if self.is_hot() {
            self.hot_streak += 1;
        } else {
            self.hot_streak = 0;
        }
        self.hot_streak >= threshold
    }
}

/// Object-safe view over a [`Monitor<M>`] so the runtime can keep a
/// registry of heterogeneous monitor types, one singleton per Rust type
/// (specification §4.5: "installs a monitor (singleton per type per
/// runtime)").
pub trait MonitorEntity: Send {
    fn notify(&mut self, event: BoxedEvent) -> Result<(), UserError>;
    fn current_state_name(&self) -> &str;
    fn is_hot(&self) -> bool;
    fn note_step(&mut self, threshold: u32) -> bool;
}

impl<M: Send + 'static> MonitorEntity for Monitor<M> {
    fn notify(&mut self, event: BoxedEvent) -> Result<(), UserError> {
        Monitor::notify(self, event)
    }

    fn current_state_name(&self) -> &str {
        Monitor::current_state(self)
    }

    fn is_hot(&self) -> bool {
        Monitor::is_hot(self)
    }

    fn note_step(&mut self, threshold: u32) -> bool {
        Monitor::note_step(self, threshold)
    }
}

/// Type tag used to key the runtime's monitor registry — one per
/// `Monitor<M>`'s state type `M`, matching "singleton per type".
pub fn monitor_type_id<M: 'static>() -> TypeId {
    TypeId::of::<M>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Done;

    struct Counter {
        starts: u32,
    }

    #[test]
    fn hot_state_streak_resets_on_goto_to_cold() {
        let mut monitor = Monitor::builder()
            .state("Busy", |s| {
                s.hot().on::<Done, _>(|_state, _event| Ok(MonitorOutcome::Goto("Idle".into())))
            })
            .state("Idle", |s| s)
            .build("Busy", Counter { starts: 0 });

        assert!(monitor.is_hot());
        assert!(!monitor.note_step(3));
        assert!(!monitor.note_step(3));
        assert!(monitor.note_step(3));

        monitor.notify(Box::new(Done)).unwrap();
        assert_eq!(monitor.current_state(), "Idle");
        assert!(!monitor.is_hot());
        assert!(!monitor.note_step(3));
    }

    #[test]
    fn entry_and_exit_actions_run_on_transition() {
        let monitor = Monitor::builder()
            .state("Busy", |s| {
                s.hot()
                    .on_exit(|state: &mut Counter| state.starts += 100)
                    .on::<Done, _>(|_state, _event| Ok(MonitorOutcome::Goto("Idle".into())))
            })
            .state("Idle", |s| s.on_entry(|state: &mut Counter| state.starts += 1))
            .build("Busy", Counter { starts: 0 });

        let mut monitor = monitor;
        monitor.notify(Box::new(Done)).unwrap();
        assert_eq!(monitor.current_state(), "Idle");
    }
}
