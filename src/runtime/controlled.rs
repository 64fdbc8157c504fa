//! The scheduler-driven runtime used under test: every decision point funnels
//! through [`Scheduler::checkpoint`] so a single active [`Strategy`] decides
//! which actor's handler task actually runs between any two points where two
//! or more tasks could have gone next.
//!
//! Concurrency here is real (every actor's handler loop is a genuine `tokio`
//! task, potentially on a different worker thread), but *progress* is not:
//! every task except the one the scheduler just picked is parked on a
//! private gate, so only one task's code executes at a time. This gives the
//! cooperative, single-stepped semantics specification §5 asks for without a
//! bespoke single-threaded executor.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use smallvec::SmallVec;
use tokio::sync::Mutex as AsyncMutex;

use crate::actor::{ActorOutcome, Entity, EntityHooks};
use crate::context::ActorContext;
use crate::error::{ExceptionHandlerResult, FailureSink, FirstFailureSink, WeaveError};
use crate::event::{BoxedEvent, EventInfo, EventTypeId, HaltEvent, InboxEntry};
use crate::hooks::DropReason;
use crate::id::{ActorId, EventGroup};
use crate::monitor::MonitorEntity;
use crate::queue::{Completer, EnqueueOutcome, EventQueue, PendingReceive, RaiseAlreadyPending};
use crate::scheduler::{BlockReason, Scheduler};
use crate::testing::trace::{Tag, TraceLog};

use super::{ReceivePredicate, Runtime};

struct ActorCell {
    id: ActorId,
    queue: EventQueue,
    entity: AsyncMutex<Box<dyn Entity>>,
}

/// The testing runtime: one per iteration. Holds every actor created during
/// that iteration, the monitor registry, the shared [`Scheduler`], and the
/// [`FirstFailureSink`] the [`TestingEngine`](crate::testing::TestingEngine)
/// reads after the run.
pub struct ControlledRuntime {
    self_weak: Mutex<Weak<ControlledRuntime>>,
    scheduler: Arc<Scheduler>,
    actors: Mutex<HashMap<ActorId, Arc<ActorCell>>>,
    monitors: Mutex<HashMap<TypeId, Box<dyn MonitorEntity>>>,
    failures: Arc<FirstFailureSink>,
    trace: Arc<TraceLog>,
    send_sequence: Mutex<HashMap<ActorId, u64>>,
}

impl ControlledRuntime {
    /// Builds a fresh runtime bound to `scheduler`, recording a trace into
    /// `trace`. One instance backs exactly one testing iteration.
    pub fn new(scheduler: Arc<Scheduler>, trace: Arc<TraceLog>) -> Arc<Self> {
        Arc::new_cyclic(|weak| ControlledRuntime {
            self_weak: Mutex::new(weak.clone()),
            scheduler,
            actors: Mutex::new(HashMap::new()),
            monitors: Mutex::new(HashMap::new()),
            failures: Arc::new(FirstFailureSink::new()),
            trace,
            send_sequence: Mutex::new(HashMap::new()),
        })
    }

    /// The first fatal failure reported this iteration, if any.
    pub fn first_failure(&self) -> Option<WeaveError> {
        self.failures.take()
    }

    pub fn has_failed(&self) -> bool {
        self.failures.has_failed()
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn trace(&self) -> &Arc<TraceLog> {
        &self.trace
    }

    /// Advances every registered monitor's hot-streak counter by one step
    /// and reports whether any of them just crossed `threshold`
    /// consecutive steps in a hot state (specification §4.4/§4.6).
    pub fn check_liveness(&self, threshold: u32) -> Option<String> {
        let mut monitors = self.monitors.lock().unwrap();
        for monitor in monitors.values_mut() {
            if monitor.note_step(threshold) {
                return Some(monitor.current_state_name().to_string());
            }
        }
        None
    }

    /// A snapshot of every actor alive right now, with its current
    /// hierarchical state name if it has one — used to build a
    /// [`BugReport`](crate::testing::report::BugReport)'s actor graph.
    pub async fn actor_snapshot(&self) -> Vec<(ActorId, Option<String>)> {
        let cells: Vec<Arc<ActorCell>> = self.actors.lock().unwrap().values().cloned().collect();
        let mut snapshot = Vec::with_capacity(cells.len());
        for cell in cells {
            let state = cell.entity.lock().await.current_state_name();
            snapshot.push((cell.id.clone(), state));
        }
        snapshot
    }

    fn self_arc(&self) -> Arc<ControlledRuntime> {
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

    /// Drives `id`'s handler loop until the queue is empty and idle, the
    /// entity halts, or a fatal failure ends the action early.
    async fn run_handler_loop(self: Arc<Self>, id: ActorId) {
        loop {
            self.scheduler.checkpoint(&id).await;
            let cell = self.cell(&id);

            let dequeued = {
                let entity = cell.entity.lock().await;
                cell.queue.dequeue(&EntityHooks(&**entity))
            };

            let (event, group, info): (BoxedEvent, EventGroup, EventInfo) = match dequeued {
                crate::queue::DequeueOutcome::NotAvailable => {
                    self.scheduler
                        .mark_blocked(&id, BlockReason::Idle);
                    return;
                }
                crate::queue::DequeueOutcome::Default => {
                    let info = EventInfo::new(id.clone(), None, EventGroup::root(), 0);
                    (
                        Box::new(crate::event::DefaultEvent),
                        EventGroup::root(),
                        info,
                    )
                }
                crate::queue::DequeueOutcome::Raised(event, group) => {
                    self.trace
                        .log(Tag::DequeueLog, format!("{} dequeued raised event", id));
                    let info = EventInfo::new(id.clone(), None, group.clone(), 0);
                    (event, group, info)
                }
                crate::queue::DequeueOutcome::Success(entry) => {
                    self.trace
                        .log(Tag::DequeueLog, format!("{} dequeued {:?}", id, entry.event));
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
        if let Err(_closed_with_pending_receive) = cell.queue.close() {
            self.report_failure(WeaveError::InvariantViolation(format!(
                "{} invoked ReceiveEventAsync while halting",
                id
            )));
        }
        self.trace.log(Tag::StateLog, format!("{} halted", id));
        self.scheduler.mark_completed(id);
    }
}

#[async_trait::async_trait]
impl Runtime for ControlledRuntime {
    fn create_actor(
        &self,
        name: &str,
        entity: Box<dyn Entity>,
        initial_event: Option<BoxedEvent>,
        group: EventGroup,
    ) -> ActorId {
        let id = ActorId::new(name.to_string());
        self.scheduler.register(&id);
        let cell = Arc::new(ActorCell {
            id: id.clone(),
            queue: EventQueue::new(),
            entity: AsyncMutex::new(entity),
        });
        self.actors.lock().unwrap().insert(id.clone(), cell.clone());
        self.trace.log(Tag::CreateLog, format!("{} created", id));

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
            if cell.queue.is_empty() {
                rt.scheduler.mark_blocked(&spawned_id, BlockReason::Idle);
                return;
            }
            rt.run_handler_loop(spawned_id).await;
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
        self.trace.log(
            Tag::SendLog,
            format!("{} sent {:?} to {}", sender, event, target),
        );
        let outcome = cell.queue.enqueue(event, group, info, &EntityHooksOwned);
        self.trace
            .log(Tag::EnqueueLog, format!("{} -> {}: {:?}", sender, target, outcome));
        match outcome {
            EnqueueOutcome::EventHandlerNotRunning => {
                self.scheduler.register(target);
                let rt = self.self_arc();
                let id = target.clone();
                tokio::spawn(async move { rt.run_handler_loop(id).await });
            }
            EnqueueOutcome::Received => {
                self.scheduler.mark_ready_after_receive(target);
            }
            EnqueueOutcome::EventHandlerRunning | EnqueueOutcome::Dropped => {}
        }
    }

    async fn receive(
        &self,
        actor: &ActorId,
        awaited: SmallVec<[EventTypeId; 4]>,
        predicate: Option<ReceivePredicate>,
    ) -> InboxEntry {
        self.scheduler.checkpoint(actor).await;
        let cell = self.cell(actor);

        if let Some(entry) = cell.queue.try_receive_now(&awaited, predicate.as_deref()) {
            self.trace
                .log(Tag::DequeueLog, format!("{} received without waiting", actor));
            return entry;
        }

        let (tx, rx) = tokio::sync::oneshot::channel::<InboxEntry>();
        let scheduler = Arc::clone(&self.scheduler);
        let receiver_id = actor.clone();
        let completer: Completer = Box::new(move |event, group, info| {
            let _ = tx.send(InboxEntry::new(event, group, info));
            scheduler.mark_ready_after_receive(&receiver_id);
        });
        let awaited_for_block = awaited.to_vec();
        cell.queue
            .register_pending_receive(PendingReceive::new(awaited, predicate, completer));
        self.scheduler
            .mark_blocked(actor, BlockReason::ReceiveOn(awaited_for_block));

        let entry = rx
            .await
            .expect("a pending receive's completer always fires exactly once");
        self.scheduler.wait_for_gate(actor).await;
        entry
    }

    fn raise(
        &self,
        actor: &ActorId,
        event: BoxedEvent,
        group: EventGroup,
    ) -> Result<(), RaiseAlreadyPending> {
        let sequence = self.next_send_sequence(actor);
        let info = EventInfo::new(actor.clone(), None, group.clone(), sequence);
        let cell = self.cell(actor);
        self.trace
            .log(Tag::SendLog, format!("{} raised {:?}", actor, event));
        cell.queue.raise(event, group, info)
    }

    fn random_bool(&self, actor: &ActorId) -> bool {
        let value = self.scheduler.random_bool();
        self.trace
            .log(Tag::StrategyLog, format!("{} drew random bool {}", actor, value));
        value
    }

    fn random_integer(&self, actor: &ActorId, bound: u64) -> u64 {
        let value = self.scheduler.random_integer(bound);
        self.trace.log(
            Tag::StrategyLog,
            format!("{} drew random integer {} (bound {})", actor, value, bound),
        );
        value
    }

    fn register_monitor(&self, type_id: TypeId, monitor: Box<dyn MonitorEntity>) {
        self.monitors.lock().unwrap().insert(type_id, monitor);
    }

    fn monitor_notify(&self, type_id: TypeId, event: BoxedEvent) {
        let mut monitors = self.monitors.lock().unwrap();
        if let Some(monitor) = monitors.get_mut(&type_id) {
            self.trace
                .log(Tag::MonitorLog, format!("monitor notified with {:?}", event));
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
        self.trace.log(Tag::ErrorLog, error.to_string());
        self.failures.report(error);
    }
}

/// An [`ActorManagerHooks`](crate::hooks::ActorManagerHooks) used only for
/// the `enqueue` side of a send, where ignore/defer policy is irrelevant
/// (those only govern *dequeue* order) but the trait is still required to
/// report drop notifications.
struct EntityHooksOwned;

impl crate::hooks::ActorManagerHooks for EntityHooksOwned {
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
