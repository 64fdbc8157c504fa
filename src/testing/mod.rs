//! The testing engine (specification §4.7): runs a user entry delegate many
//! times, once per seeded iteration, driving the [`Scheduler`] to
//! quiescence, a bug, or a budget, and collecting a [`BugReport`] for
//! whichever iterations fail.

pub mod report;
pub mod trace;

use std::any::TypeId;
use std::sync::Arc;

use enum_iterator::IntoEnumIterator;
use serde::{Deserialize, Serialize};

use crate::error::WeaveError;
use crate::monitor::{Monitor, MonitorEntity};
use crate::runtime::ControlledRuntime;
use crate::scheduler::{
    ExhaustiveStrategy, FairRandomStrategy, PctStrategy, RandomStrategy, Scheduler,
    SchedulerConfig, StepOutcome, Strategy,
};

pub use report::{ActorGraphNode, BugReport};
pub use trace::TraceLog;

/// Which [`Strategy`] a [`TestConfig`] should build for each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoEnumIterator)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Random,
    Exhaustive,
    Pct,
    FairRandom,
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::Random
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StrategyKind::Random => "random",
            StrategyKind::Exhaustive => "exhaustive",
            StrategyKind::Pct => "pct",
            StrategyKind::FairRandom => "fair-random",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(StrategyKind::Random),
            "exhaustive" => Ok(StrategyKind::Exhaustive),
            "pct" => Ok(StrategyKind::Pct),
            "fair-random" => Ok(StrategyKind::FairRandom),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

fn build_strategy(kind: StrategyKind, config: &TestConfig) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::Random => Box::new(RandomStrategy::new()),
        StrategyKind::Exhaustive => Box::new(ExhaustiveStrategy::new()),
        StrategyKind::Pct => Box::new(PctStrategy::new(config.pct_max_priority_changes)),
        StrategyKind::FairRandom => Box::new(FairRandomStrategy::new(config.max_fair_steps)),
    }
}

/// The testing engine's configuration, per specification §4.7.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub iterations: u64,
    pub strategy: StrategyKind,
    pub seed: u64,
    pub max_unfair_steps: u64,
    pub max_fair_steps: u64,
    pub liveness_temperature_threshold: u32,
    pub pct_max_priority_changes: usize,
    /// Whether the engine stops at the first bug found (the default) or
    /// keeps running the remaining iterations, per §4.7: "If a bug is
    /// found, the engine stops (or continues, per config)".
    pub stop_on_first_bug: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        TestConfig {
            iterations: 100,
            strategy: StrategyKind::Random,
            seed: 0,
            max_unfair_steps: 10_000,
            max_fair_steps: 5_000,
            liveness_temperature_threshold: 50,
            pct_max_priority_changes: 3,
            stop_on_first_bug: true,
        }
    }
}

impl TestConfig {
    /// A small, fast-running configuration suitable for `#[tokio::test]`s.
    pub fn default_for_tests() -> Self {
        TestConfig {
            iterations: 20,
            max_unfair_steps: 1_000,
            max_fair_steps: 500,
            liveness_temperature_threshold: 10,
            ..Default::default()
        }
    }

    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_unfair_steps: self.max_unfair_steps,
            max_fair_steps: self.max_fair_steps,
            liveness_temperature_threshold: self.liveness_temperature_threshold,
        }
    }
}

type MonitorFactory = Box<dyn Fn() -> (TypeId, Box<dyn MonitorEntity>) + Send + Sync>;

/// Drives [`TestConfig::iterations`] fresh runs of an entry delegate,
/// collecting a [`BugReport`] per failing iteration.
pub struct TestingEngine {
    config: TestConfig,
    entry: Box<dyn Fn(&Arc<ControlledRuntime>) + Send + Sync>,
    monitor_factories: Vec<MonitorFactory>,
}

/// The outcome of running a [`TestingEngine`] to completion (or to its
/// configured stopping point).
#[derive(Debug, Default)]
pub struct TestingResult {
    pub iterations_run: u64,
    pub bugs: Vec<BugReport>,
}

/// The outcome of [`TestingEngine::replay`]: the trace a failing iteration
/// produces when re-driven from its recorded seed and strategy alone, and
/// whether it's identical to the trace that was originally captured.
#[derive(Debug)]
pub struct ReplayOutcome {
    pub error: Option<WeaveError>,
    pub trace: Vec<crate::testing::trace::TraceRecord>,
    /// Whether `trace` is byte-for-byte identical to the [`BugReport`] it
    /// replayed, confirming specification §8's "determinism under replay"
    /// property for this particular failure.
    pub matches_original: bool,
}

impl TestingResult {
    pub fn passed(&self) -> bool {
        self.bugs.is_empty()
    }
}

impl TestingEngine {
    pub fn new(
        config: TestConfig,
        entry: impl Fn(&Arc<ControlledRuntime>) + Send + Sync + 'static,
    ) -> Self {
        TestingEngine {
            config,
            entry: Box::new(entry),
            monitor_factories: Vec::new(),
        }
    }

    /// Registers a monitor factory, invoked fresh at the start of every
    /// iteration so each run starts with a clean monitor state
    /// (specification §4.5: "singleton per type per runtime").
    pub fn with_monitor<M, F>(mut self, factory: F) -> Self
    where
        M: Send + 'static,
        F: Fn() -> Monitor<M> + Send + Sync + 'static,
    {
        self.monitor_factories.push(Box::new(move || {
            (
                crate::monitor::monitor_type_id::<M>(),
                Box::new(factory()) as Box<dyn MonitorEntity>,
            )
        }));
        self
    }

    /// Runs every configured iteration, stopping early per
    /// [`TestConfig::stop_on_first_bug`].
    pub async fn run(&self) -> TestingResult {
        let mut result = TestingResult::default();

        for iteration in 0..self.config.iterations {
            let seed = self.config.seed.wrapping_add(iteration);
            let strategy = build_strategy(self.config.strategy, &self.config);
            let scheduler = Scheduler::new(strategy, seed, self.config.scheduler_config());
            let trace = Arc::new(TraceLog::new());
            let runtime = ControlledRuntime::new(Arc::clone(&scheduler), Arc::clone(&trace));

            for factory in &self.monitor_factories {
                let (type_id, monitor) = factory();
                runtime.register_monitor(type_id, monitor);
            }

            (self.entry)(&runtime);
            result.iterations_run += 1;

            let failure = self.drive_iteration(&runtime, &scheduler).await;

            if let Some(error) = failure {
                let actors = runtime
                    .actor_snapshot()
                    .await
                    .into_iter()
                    .map(|(id, state)| ActorGraphNode {
                        actor: id.to_string(),
                        state,
                    })
                    .collect();
                result.bugs.push(BugReport::new(
                    iteration,
                    seed,
                    self.config.strategy.to_string(),
                    error,
                    trace.records(),
                    actors,
                ));
                if self.config.stop_on_first_bug {
                    break;
                }
            }

            scheduler.on_iteration_complete();
            if scheduler.is_strategy_exhausted() {
                break;
            }
        }

        result
    }

    /// Re-drives the iteration that produced `report`, using its recorded
    /// seed and strategy against this same entry delegate, and diffs the
    /// resulting trace against the one `report` captured (specification §8:
    /// "a failing iteration must be replayable [from the seed alone] to
    /// produce the same event trace").
    pub async fn replay(&self, report: &BugReport) -> ReplayOutcome {
        let strategy_kind: StrategyKind = report
            .strategy
            .parse()
            .expect("BugReport::strategy is always a StrategyKind::to_string() rendering");
        let strategy = build_strategy(strategy_kind, &self.config);
        let scheduler = Scheduler::new(strategy, report.seed, self.config.scheduler_config());
        let trace = Arc::new(TraceLog::new());
        let runtime = ControlledRuntime::new(Arc::clone(&scheduler), Arc::clone(&trace));

        for factory in &self.monitor_factories {
            let (type_id, monitor) = factory();
            runtime.register_monitor(type_id, monitor);
        }

        (self.entry)(&runtime);
        let error = self.drive_iteration(&runtime, &scheduler).await;
        let replayed = trace.records();
        let matches_original = replayed == report.trace;

        ReplayOutcome {
            error,
            trace: replayed,
            matches_original,
        }
    }

    async fn drive_iteration(
        &self,
        runtime: &Arc<ControlledRuntime>,
        scheduler: &Arc<Scheduler>,
    ) -> Option<WeaveError> {
        loop {
            if let Some(error) = runtime.first_failure() {
                return Some(error);
            }

            match scheduler.step().await {
                StepOutcome::Advanced(_) => {
                    tokio::task::yield_now().await;
                    if let Some(hot_state) = runtime.check_liveness(
                        self.config.liveness_temperature_threshold,
                    ) {
                        return Some(WeaveError::LivenessViolation { hot_state });
                    }
                }
                StepOutcome::Quiescent => return runtime.first_failure(),
                StepOutcome::Deadlock(waiting) => {
                    if let Some(error) = runtime.first_failure() {
                        return Some(error);
                    }
                    let waiting = describe_waiting(&waiting);
                    return Some(WeaveError::Deadlock { waiting });
                }
                StepOutcome::BudgetExceeded => {
                    return Some(WeaveError::InvariantViolation(
                        "MaxUnfairSteps exceeded before the iteration reached quiescence".into(),
                    ));
                }
            }
        }
    }
}

fn describe_waiting(waiting: &[crate::id::ActorId]) -> String {
    let mut sorted: Vec<&crate::id::ActorId> = waiting.iter().collect();
    sorted.sort_by_key(|id| id.index());
    let names: Vec<String> = sorted.iter().map(|id| format!("{}()", id.name())).collect();
    match names.len() {
        0 => String::new(),
        1 => names[0].clone(),
        _ => {
            let (last, rest) = names.split_last().unwrap();
            format!("{} and {}", rest.join(", "), last)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_kind_round_trips_through_display_and_from_str() {
        for kind in StrategyKind::into_enum_iter() {
            let rendered = kind.to_string();
            let parsed: StrategyKind = rendered.parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn describe_waiting_matches_deadlock_message_shape() {
        let a = crate::id::ActorId::new("A");
        let b = crate::id::ActorId::new("B");
        let description = describe_waiting(&[b.clone(), a.clone()]);
        assert_eq!(description, "A() and B()");
    }

    #[derive(Debug, Clone, Copy)]
    struct Unhandled;

    fn unhandled_event_entry(runtime: &Arc<ControlledRuntime>) {
        let table = crate::actor::DispatchTable::<()>::builder().build();
        let actor = Box::new(crate::actor::TableActor::new((), table));
        let id = runtime.create_actor("A", actor, None, crate::id::EventGroup::root());
        let driver = crate::id::ActorId::new("Driver");
        runtime.send(
            &driver,
            None,
            &id,
            Box::new(Unhandled),
            crate::id::EventGroup::root(),
        );
    }

    #[tokio::test]
    async fn replay_reproduces_the_original_trace() {
        let mut config = TestConfig::default_for_tests();
        config.iterations = 1;
        let engine = TestingEngine::new(config, unhandled_event_entry);
        let result = engine.run().await;
        assert_eq!(result.bugs.len(), 1);

        let outcome = engine.replay(&result.bugs[0]).await;
        assert!(outcome.matches_original);
        assert_eq!(
            outcome.error.map(|e| e.to_string()),
            Some(result.bugs[0].error.clone())
        );
    }
}
