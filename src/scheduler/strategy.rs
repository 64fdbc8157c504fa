//! The pluggable exploration strategy interface.
//!
//! A strategy's only job is to pick one operation out of the set currently
//! waiting at a decision point. Everything about *how* it picks — uniformly
//! at random, exhaustively, with bounded priority switches, fairly — is the
//! strategy's own business; the [`Scheduler`](super::Scheduler) just asks.

use rand_chacha::ChaCha8Rng;

use crate::id::ActorId;

/// A strategy selects the next operation to advance from the set of
/// operations currently enabled and waiting at a decision point.
///
/// Implementations must be deterministic given the same `rng` state and the
/// same sequence of `ready` sets, so that a fixed seed always reproduces the
/// same schedule (specification §8, "Determinism under replay").
pub trait Strategy: Send {
    /// Picks one id out of `ready` (which is never empty when this is
    /// called). `step` is the number of operations already advanced this
    /// iteration, for strategies that change behavior over the course of a
    /// run (PCT's priority-change points, fair-random's fairness cutover).
    fn next_operation(&mut self, ready: &[ActorId], step: u64, rng: &mut ChaCha8Rng) -> ActorId;

    /// A short, stable name used in trace output (`StrategyLog`).
    fn name(&self) -> &'static str;

    /// Called once per testing iteration before the first decision point,
    /// so stateful strategies (PCT's priority list, fair-random's cutover)
    /// can reset for the new run.
    fn reset_for_iteration(&mut self, _iteration: u64, _rng: &mut ChaCha8Rng) {}

    /// Called once after an iteration ends (success or bug), so strategies
    /// that systematically enumerate schedules (exhaustive DFS) can advance
    /// their exploration state to the next path.
    fn on_iteration_complete(&mut self) {}

    /// True once the strategy has no more distinct schedules left to try.
    /// Bounded strategies (random, PCT, fair-random) never report done; the
    /// testing engine stops them by iteration count instead.
    fn is_exhausted(&self) -> bool {
        false
    }
}
