//! The testing scheduler: a registry of per-operation state plus the
//! decision-point protocol that drives every controlled operation through a
//! pluggable [`Strategy`].
//!
//! One *operation* in this implementation corresponds to one actor's
//! handler task — the finest grain §5 ever asks the scheduler to arbitrate
//! between is "which actor's handler runs next", so there is no separate
//! operation identity beyond [`ActorId`]. Concurrency during a test run is
//! simulated on top of a real `tokio` executor: every actor handler task
//! calls [`Scheduler::checkpoint`] at each suspension point from §5 and
//! suspends on a private [`tokio::sync::Notify`] until the active strategy
//! picks it. Because every *other* task is parked the same way, only the
//! chosen task's code actually executes between one `checkpoint` call and
//! the next — giving genuinely cooperative, single-stepped semantics on top
//! of a multi-threaded runtime, without requiring a bespoke single-threaded
//! executor.

pub mod exhaustive;
pub mod fair_random;
pub mod pct;
pub mod random;
pub mod strategy;

pub use exhaustive::ExhaustiveStrategy;
pub use fair_random::FairRandomStrategy;
pub use pct::PctStrategy;
pub use random::RandomStrategy;
pub use strategy::Strategy;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::Notify;

use crate::event::EventTypeId;
use crate::id::ActorId;

/// Builds a `ChaCha8Rng` from a 64-bit seed, the single source of
/// randomness an iteration's strategy and any `Random()`/`RandomInteger()`
/// calls draw from, so that seed + strategy + entry delegate fully
/// determines the resulting trace (specification §8, property 5).
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Why an operation is currently unable to advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Suspended in `ReceiveEventAsync` awaiting one of these event types.
    ReceiveOn(Vec<EventTypeId>),
    /// Suspended waiting for an abstract timer to fire.
    WaitTimer,
    /// The actor has halted; its operation will never run again.
    Halted,
    /// No handler task is currently running for this actor (its queue went
    /// empty); it will resume once something is sent to it.
    Idle,
}

/// The state of one schedulable operation (one actor's handler task).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Enabled,
    Blocked(BlockReason),
    Completed,
}

/// Result of one [`Scheduler::step`] call.
#[derive(Debug)]
pub enum StepOutcome {
    /// `id`'s operation was resumed and is now running.
    Advanced(ActorId),
    /// Every operation has completed; the iteration ended cleanly.
    Quiescent,
    /// Nothing can advance and at least one operation is blocked awaiting a
    /// receive — the deadlock condition from §4.6.
    Deadlock(Vec<ActorId>),
    /// `MaxUnfairSteps` was reached; the iteration must be aborted.
    BudgetExceeded,
}

/// Tunable limits and thresholds a [`Scheduler`] enforces, mirroring the
/// `TestConfig` fields from §4.7.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub max_unfair_steps: u64,
    pub max_fair_steps: u64,
    pub liveness_temperature_threshold: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_unfair_steps: 10_000,
            max_fair_steps: 5_000,
            liveness_temperature_threshold: 50,
        }
    }
}

struct SchedulerState {
    states: HashMap<ActorId, OperationState>,
    ready: HashSet<ActorId>,
    step_count: u64,
}

/// The central decision-point registry and strategy driver for one testing
/// iteration. A fresh `Scheduler` (or at least a freshly-reset one) backs
/// every iteration run by the [`TestingEngine`](crate::testing::TestingEngine).
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    strategy: Mutex<Box<dyn Strategy>>,
    rng: Mutex<ChaCha8Rng>,
    gates: Mutex<HashMap<ActorId, Arc<Notify>>>,
    driver_notify: Notify,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(strategy: Box<dyn Strategy>, seed: u64, config: SchedulerConfig) -> Arc<Self> {
        Arc::new(Scheduler {
            state: Mutex::new(SchedulerState {
                states: HashMap::new(),
                ready: HashSet::new(),
                step_count: 0,
            }),
            strategy: Mutex::new(strategy),
            rng: Mutex::new(seeded_rng(seed)),
            gates: Mutex::new(HashMap::new()),
            driver_notify: Notify::new(),
            config,
        })
    }

    fn gate_for(&self, id: &ActorId) -> Arc<Notify> {
        self.gates
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Registers a brand-new operation as enabled (called when an actor is
    /// created, before its handler task is spawned).
    pub fn register(&self, id: &ActorId) {
        self.state
            .lock()
            .unwrap()
            .states
            .entry(id.clone())
            .or_insert(OperationState::Enabled);
    }

    pub fn mark_blocked(&self, id: &ActorId, reason: BlockReason) {
        let mut state = self.state.lock().unwrap();
        state.states.insert(id.clone(), OperationState::Blocked(reason));
        state.ready.remove(id);
        self.driver_notify.notify_one();
    }

    pub fn mark_completed(&self, id: &ActorId) {
        let mut state = self.state.lock().unwrap();
        state.states.insert(id.clone(), OperationState::Completed);
        state.ready.remove(id);
        self.driver_notify.notify_one();
    }

    pub fn operation_state(&self, id: &ActorId) -> Option<OperationState> {
        self.state.lock().unwrap().states.get(id).cloned()
    }

    /// Called by an actor task at every suspension point enumerated in §5:
    /// registers the operation as ready-to-advance and suspends until the
    /// strategy picks it.
    pub async fn checkpoint(&self, id: &ActorId) {
        {
            let mut state = self.state.lock().unwrap();
            state.states.insert(id.clone(), OperationState::Enabled);
            state.ready.insert(id.clone());
        }
        self.driver_notify.notify_one();
        let gate = self.gate_for(id);
        gate.notified().await;
    }

    /// Drives exactly one scheduling decision. Blocks until an operation is
    /// ready to be picked, or a terminal condition (quiescence, deadlock,
    /// budget exhaustion) is reached.
    pub async fn step(&self) -> StepOutcome {
        loop {
            {
                let mut state = self.state.lock().unwrap();

                if state.step_count >= self.config.max_unfair_steps {
                    return StepOutcome::BudgetExceeded;
                }

                let mut candidates: Vec<ActorId> = state
                    .ready
                    .iter()
                    .filter(|id| matches!(state.states.get(*id), Some(OperationState::Enabled)))
                    .cloned()
                    .collect();
                // A blocked timer is itself a nondeterministic decision:
                // "firing" it is a valid choice at this decision point.
                candidates.extend(state.states.iter().filter_map(|(id, s)| {
                    matches!(s, OperationState::Blocked(BlockReason::WaitTimer)).then(|| id.clone())
                }));

                if !candidates.is_empty() {
                    let chosen = {
                        let mut strategy = self.strategy.lock().unwrap();
                        let mut rng = self.rng.lock().unwrap();
                        strategy.next_operation(&candidates, state.step_count, &mut rng)
                    };
                    state.ready.remove(&chosen);
                    state.states.insert(chosen.clone(), OperationState::Enabled);
                    state.step_count += 1;
                    tracing::trace!(actor = %chosen, step = state.step_count, "scheduler advancing operation");
                    drop(state);
                    self.gate_for(&chosen).notify_one();
                    return StepOutcome::Advanced(chosen);
                }

                let any_in_flight = state
                    .states
                    .values()
                    .any(|s| matches!(s, OperationState::Enabled));
                if !any_in_flight {
                    let waiting: Vec<ActorId> = state
                        .states
                        .iter()
                        .filter(|(_, s)| matches!(s, OperationState::Blocked(BlockReason::ReceiveOn(_))))
                        .map(|(id, _)| id.clone())
                        .collect();
                    if waiting.is_empty() {
                        return StepOutcome::Quiescent;
                    }
                    return StepOutcome::Deadlock(waiting);
                }
            }
            self.driver_notify.notified().await;
        }
    }

    pub fn reset_for_iteration(&self, iteration: u64) {
        let mut state = self.state.lock().unwrap();
        state.states.clear();
        state.ready.clear();
        state.step_count = 0;
        drop(state);
        let mut rng = self.rng.lock().unwrap();
        self.strategy.lock().unwrap().reset_for_iteration(iteration, &mut rng);
    }

    pub fn on_iteration_complete(&self) {
        self.strategy.lock().unwrap().on_iteration_complete();
    }

    pub fn is_strategy_exhausted(&self) -> bool {
        self.strategy.lock().unwrap().is_exhausted()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.lock().unwrap().name()
    }

    pub fn step_count(&self) -> u64 {
        self.state.lock().unwrap().step_count
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Suspends the calling task on `id`'s private gate without touching
    /// its `OperationState` — used by a pending receive that has already
    /// been matched and is waiting for the driver to formally re-enable it
    /// via [`Scheduler::mark_ready_after_receive`].
    pub async fn wait_for_gate(&self, id: &ActorId) {
        let gate = self.gate_for(id);
        gate.notified().await;
    }

    /// Re-enables an operation that was blocked on `ReceiveOn` after a
    /// matching event was enqueued for it, without running the operation's
    /// checkpoint bookkeeping again (the checkpoint already happened when
    /// it first suspended to receive).
    pub fn mark_ready_after_receive(&self, id: &ActorId) {
        let mut state = self.state.lock().unwrap();
        state.states.insert(id.clone(), OperationState::Enabled);
        state.ready.insert(id.clone());
        drop(state);
        self.driver_notify.notify_one();
    }

    /// Draws a uniform random `bool`, routed through the same seeded RNG
    /// the active strategy uses, per §4.5's `Random()`.
    pub fn random_bool(&self) -> bool {
        use rand::Rng;
        self.rng.lock().unwrap().gen_bool(0.5)
    }

    /// Draws a uniform random integer in `[0, bound)`, per §4.5's
    /// `RandomInteger(n)`.
    pub fn random_integer(&self, bound: u64) -> u64 {
        use rand::Rng;
        self.rng.lock().unwrap().gen_range(0, bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn checkpoint_suspends_until_scheduler_picks_it() {
        let scheduler = Scheduler::new(Box::new(RandomStrategy::new()), 42, SchedulerConfig::default());
        let id = ActorId::new("A");
        scheduler.register(&id);

        let sched2 = StdArc::clone(&scheduler);
        let id2 = id.clone();
        let handle = tokio::spawn(async move {
            sched2.checkpoint(&id2).await;
            true
        });

        match scheduler.step().await {
            StepOutcome::Advanced(chosen) => assert_eq!(chosen, id),
            other => panic!("expected Advanced, got {:?}", other),
        }
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn quiescent_when_all_completed() {
        let scheduler = Scheduler::new(Box::new(RandomStrategy::new()), 1, SchedulerConfig::default());
        let id = ActorId::new("A");
        scheduler.register(&id);
        scheduler.mark_completed(&id);
        match scheduler.step().await {
            StepOutcome::Quiescent => {}
            other => panic!("expected Quiescent, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn deadlock_when_all_blocked_on_receive() {
        let scheduler = Scheduler::new(Box::new(RandomStrategy::new()), 1, SchedulerConfig::default());
        let a = ActorId::new("A");
        let b = ActorId::new("B");
        scheduler.register(&a);
        scheduler.register(&b);
        scheduler.mark_blocked(&a, BlockReason::ReceiveOn(vec![]));
        scheduler.mark_blocked(&b, BlockReason::ReceiveOn(vec![]));
        match scheduler.step().await {
            StepOutcome::Deadlock(mut waiting) => {
                waiting.sort_by_key(|id| id.index());
                assert_eq!(waiting.len(), 2);
            }
            other => panic!("expected Deadlock, got {:?}", other),
        }
    }
}
