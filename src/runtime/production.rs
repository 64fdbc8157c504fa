//! The production runtime: the same actor/queue/dispatch machinery as
//! [`ControlledRuntime`](super::ControlledRuntime), but driven directly by
//! `tokio`'s work-stealing pool instead of a scheduler. Every decision point
//! from specification §5 is still a real suspension point — it's just that
//! nothing arbitrates *which* enabled task gets to run next beyond the
//! executor's own fairness, matching §5's "In production the same
//! abstractions map to a real multi-threaded executor where queue
//! operations are protected by per-queue locks and handler tasks run on a
//! work-stealing pool."
//!
//! Grounded in the teacher's reactor loop (`reactor::run`): a handler task
//! is spawned with `tokio::spawn` exactly once per queue transition from
//! idle to non-empty, and runs to quiescence before yielding the worker
//! thread back to the pool.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use smallvec::SmallVec;
use tokio::sync::Mutex as AsyncMutex;

use crate::actor::{ActorOutcome, Entity, EntityHooks};
use crate::context::ActorContext;
use crate::error::{ExceptionHandlerResult, FailureSink, LoggingFailureSink, WeaveError};
use crate::event::{BoxedEvent, EventInfo, EventTypeId, HaltEvent, InboxEntry};
use crate::hooks::DropReason;
use crate::id::{ActorId, EventGroup};
use crate::monitor::MonitorEntity;
use crate::queue::{Completer, EnqueueOutcome, EventQueue, PendingReceive, RaiseAlreadyPending};

use super::{ReceivePredicate, Runtime};

struct ActorCell {
    queue: EventQueue,
    entity: AsyncMutex<Box<dyn Entity>>,
}

/// A long-running, multi-threaded runtime for actually executing a system
/// (as opposed to exploring its schedules). One instance typically lives for
/// the whole process.
pub struct ProductionRuntime {
    self_weak: Mutex<Weak<ProductionRuntime>>,
    actors: Mutex<HashMap<ActorId, Arc<ActorCell>>>,
    monitors: Mutex<HashMap<TypeId, Box<dyn MonitorEntity>>>,
    failures: Arc<dyn FailureSink>,
    send_sequence: Mutex<HashMap<ActorId, u64>>,
}

impl ProductionRuntime {
    pub fn new() -> Arc<Self> {
        Self::with_failure_sink(Arc::new(LoggingFailureSink))
    }

    pub fn with_failure_sink(failures: Arc<dyn FailureSink>) -> Arc<Self> {
        Arc::new_cyclic(|weak| ProductionRuntime {
            self_weak: Mutex::new(weak.clone()),
            actors: Mutex::new(HashMap::new()),
            monitors: Mutex::new(HashMap::new()),
            failures,
            send_sequence: Mutex::new(HashMap::new()),
        })
    }

    fn self_arc(&self) -> Arc<ProductionRuntime> {
        self.self_weak
            .lock()
            .unwrap()
            .upgrade()
            .expect("runtime outlives every task it spawns")
    }

    fn cell(&self, id: &ActorId) -> Arc<ActorCell> {
        self.actors
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .expect("ActorId always refers to a cell registered at creation")
    }

    fn next_send_sequence(&self, sender: &ActorId) -> u64 {
        let mut map = self.send_sequence.lock().unwrap();
        let counter = map.entry(sender.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    async fn run_handler_loop(self: Arc<Self>, id: ActorId) {
        loop {
            let cell = self.cell(&id);
            let dequeued = {
                let entity = cell.entity.lock().await;
                cell.queue.dequeue(&EntityHooks(&**entity))
            };

            let (event, group, info): (BoxedEvent, EventGroup, EventInfo) = match dequeued {
                crate::queue::DequeueOutcome::NotAvailable => return,
                crate::queue::DequeueOutcome::Default => (
                    Box::new(crate::event::DefaultEvent),
                    EventGroup::root(),
                    EventInfo::new(id.clone(), None, EventGroup::root(), 0),
                ),
                crate::queue::DequeueOutcome::Raised(event, group) => {
                    let info = EventInfo::new(id.clone(), None, group.clone(), 0);
                    (event, group, info)
                }
                crate::queue::DequeueOutcome::Success(entry) => {
                    (entry.event, entry.group, entry.info)
                }
            };

            let event_type = event.event_type();
            let is_halt = event_type == EventTypeId::of::<HaltEvent>();
            let has_handler = {
                let entity = cell.entity.lock().await;
                entity.has_handler(event_type)
            };

            if is_halt && !has_handler {
                self.halt_actor(&id, &cell).await;
                return;
            }
            if !has_handler {
                self.report_failure(WeaveError::UnhandledEvent {
                    actor: format!("{}()", id.name()),
                    event_type: event.event_type_name().to_string(),
                });
                self.halt_actor(&id, &cell).await;
                return;
            }

            let current_state = {
                let entity = cell.entity.lock().await;
                entity.current_state_name()
            };
            let ctx = ActorContext::new(self.self_arc(), id.clone(), group, current_state);
            let outcome = {
                let mut entity = cell.entity.lock().await;
                entity.dispatch(event, ctx.current_group(), info, ctx).await
            };

            let actor_outcome = match outcome {
                Ok(outcome) => outcome,
                Err(error) => {
                    if matches!(
                        error.downcast_ref::<WeaveError>(),
                        Some(WeaveError::AssertionFailure(_))
                    ) {
                        // ActorContext::assert already reported this to the
                        // failure sink; an assertion is fatal regardless of
                        // the actor's OnException policy.
                        ActorOutcome::Halt
                    } else {
                        let mut entity = cell.entity.lock().await;
                        match entity.on_exception(&error) {
                            ExceptionHandlerResult::HandledException => ActorOutcome::Continue,
                            ExceptionHandlerResult::HaltMachine => ActorOutcome::Halt,
                            ExceptionHandlerResult::ThrowException => {
                                drop(entity);
                                self.report_failure(WeaveError::UserException {
                                    actor: id.clone(),
                                    source: error,
                                });
                                ActorOutcome::Halt
                            }
                        }
                    }
                }
            };

            match actor_outcome {
                ActorOutcome::Continue => continue,
                ActorOutcome::Halt => {
                    self.halt_actor(&id, &cell).await;
                    return;
                }
            }
        }
    }

    async fn halt_actor(&self, id: &ActorId, cell: &Arc<ActorCell>) {
        let current_state = {
            let entity = cell.entity.lock().await;
            entity.current_state_name()
        };
        let ctx = ActorContext::new(self.self_arc(), id.clone(), EventGroup::root(), current_state);
        {
            let mut entity = cell.entity.lock().await;
            entity.on_halt(ctx).await;
        }
        if cell.queue.close().is_err() {
            self.report_failure(WeaveError::InvariantViolation(format!(
                "{} invoked ReceiveEventAsync while halting",
                id
            )));
        }
    }
}

#[async_trait::async_trait]
impl Runtime for ProductionRuntime {
    fn create_actor(
        &self,
        name: &str,
        entity: Box<dyn Entity>,
        initial_event: Option<BoxedEvent>,
        group: EventGroup,
    ) -> ActorId {
        let id = ActorId::new(name.to_string());
        let cell = Arc::new(ActorCell {
            queue: EventQueue::new(),
            entity: AsyncMutex::new(entity),
        });
        self.actors.lock().unwrap().insert(id.clone(), cell.clone());

        let rt = self.self_arc();
        let spawned_id = id.clone();
        tokio::spawn(async move {
            let init_state = {
                let entity = cell.entity.lock().await;
                entity.current_state_name()
            };
            let ctx = ActorContext::new(rt.clone(), spawned_id.clone(), group, init_state);
            {
                let mut entity = cell.entity.lock().await;
                if let Err(error) = entity.on_initialize(initial_event, ctx).await {
                    rt.report_failure(WeaveError::UserException {
                        actor: spawned_id.clone(),
                        source: error,
                    });
                }
            }
            if !cell.queue.is_empty() {
                rt.run_handler_loop(spawned_id).await;
            }
        });

        id
    }

    fn send(
        &self,
        sender: &ActorId,
        sender_state: Option<String>,
        target: &ActorId,
        event: BoxedEvent,
        group: EventGroup,
    ) {
        let sequence = self.next_send_sequence(sender);
        let info = EventInfo::new(sender.clone(), sender_state, group.clone(), sequence);
        let cell = self.cell(target);
        let outcome = cell.queue.enqueue(event, group, info, &NoopHooks);
        if let EnqueueOutcome::EventHandlerNotRunning = outcome {
            let rt = self.self_arc();
            let id = target.clone();
            tokio::spawn(async move { rt.run_handler_loop(id).await });
        }
    }

    async fn receive(
        &self,
        actor: &ActorId,
        awaited: SmallVec<[EventTypeId; 4]>,
        predicate: Option<ReceivePredicate>,
    ) -> InboxEntry {
        let cell = self.cell(actor);
        if let Some(entry) = cell.queue.try_receive_now(&awaited, predicate.as_deref()) {
            return entry;
        }
        let (tx, rx) = tokio::sync::oneshot::channel::<InboxEntry>();
        let completer: Completer = Box::new(move |event, group, info| {
            let _ = tx.send(InboxEntry::new(event, group, info));
        });
        cell.queue
            .register_pending_receive(PendingReceive::new(awaited, predicate, completer));
        rx.await
            .expect("a pending receive's completer always fires exactly once")
    }

    fn raise(
        &self,
        actor: &ActorId,
        event: BoxedEvent,
        group: EventGroup,
    ) -> Result<(), RaiseAlreadyPending> {
        let sequence = self.next_send_sequence(actor);
        let info = EventInfo::new(actor.clone(), None, group.clone(), sequence);
        self.cell(actor).queue.raise(event, group, info)
    }

    fn random_bool(&self, _actor: &ActorId) -> bool {
        rand::random()
    }

    fn random_integer(&self, _actor: &ActorId, bound: u64) -> u64 {
        use rand::Rng;
        rand::thread_rng().gen_range(0, bound)
    }

    fn register_monitor(&self, type_id: TypeId, monitor: Box<dyn MonitorEntity>) {
        self.monitors.lock().unwrap().insert(type_id, monitor);
    }

    fn monitor_notify(&self, type_id: TypeId, event: BoxedEvent) {
        let mut monitors = self.monitors.lock().unwrap();
        if let Some(monitor) = monitors.get_mut(&type_id) {
            if let Err(error) = monitor.notify(event) {
                self.failures.report(WeaveError::UserException {
                    actor: ActorId::new("Monitor"),
                    source: error,
                });
            }
        }
    }

    fn create_event_group(&self) -> EventGroup {
        EventGroup::new()
    }

    fn report_failure(&self, error: WeaveError) {
        self.failures.report(error);
    }
}

struct NoopHooks;

impl crate::hooks::ActorManagerHooks for NoopHooks {
    fn is_ignored(&self, _event_type: EventTypeId) -> bool {
        false
    }

    fn is_deferred(&self, _event_type: EventTypeId) -> bool {
        false
    }

    fn has_default_handler(&self) -> bool {
        false
    }

    fn on_event_dropped(&self, event_type: EventTypeId, reason: DropReason) {
        tracing::debug!(?event_type, ?reason, "event dropped at enqueue");
    }
}
