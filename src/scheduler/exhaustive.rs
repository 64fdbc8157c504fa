//! Depth-first / exhaustive exploration strategy, suitable for programs
//! with a small state space where every interleaving can be enumerated.
//!
//! This is the classic "systematic DFS over scheduling choices" approach:
//! replay the exact sequence of choices made last iteration, then at the
//! end advance to the next path by incrementing the last decision that
//! still had an untried sibling (an odometer over decision indices), like
//! iterative backtracking search. When no decision has an untried sibling
//! left, the whole schedule space has been covered.

use rand_chacha::ChaCha8Rng;

use crate::id::ActorId;

use super::strategy::Strategy;

struct Decision {
    chosen: usize,
    count: usize,
}

#[derive(Default)]
pub struct ExhaustiveStrategy {
    /// The path taken on the previous iteration; replayed index-for-index
    /// until we run out, at which point we explore fresh, always picking
    /// the first (index 0) option to go as deep as possible before
    /// backtracking.
    previous_path: Vec<usize>,
    current_path: Vec<Decision>,
    replay_cursor: usize,
    exhausted: bool,
}

impl ExhaustiveStrategy {
    pub fn new() -> Self {
        ExhaustiveStrategy::default()
    }
}

impl Strategy for ExhaustiveStrategy {
    fn next_operation(&mut self, ready: &[ActorId], _step: u64, _rng: &mut ChaCha8Rng) -> ActorId {
        // Scheduling choices are made over a stable order so the same
        // decision index means the same thing across iterations.
        let mut sorted: Vec<&ActorId> = ready.iter().collect();
        sorted.sort_by_key(|id| id.index());

        let chosen_index = if self.replay_cursor < self.previous_path.len() {
            self.previous_path[self.replay_cursor].min(sorted.len() - 1)
        } else {
            0
        };
        self.replay_cursor += 1;
        self.current_path.push(Decision {
            chosen: chosen_index,
            count: sorted.len(),
        });
        sorted[chosen_index].clone()
    }

    fn name(&self) -> &'static str {
        "exhaustive"
    }

    fn reset_for_iteration(&mut self, _iteration: u64, _rng: &mut ChaCha8Rng) {
        self.current_path.clear();
        self.replay_cursor = 0;
    }

    fn on_iteration_complete(&mut self) {
        // Odometer-increment: find the last decision with an untried
        // sibling, bump it, and drop everything after it. If none exists
        // the whole tree has been explored.
        let mut path: Vec<usize> = self.current_path.iter().map(|d| d.chosen).collect();
        let mut found = false;
        while let Some(last) = path.pop() {
            let count = self.current_path[path.len()].count;
            if last + 1 < count {
                path.push(last + 1);
                found = true;
                break;
            }
        }
        if found {
            self.previous_path = path;
        } else {
            self.exhausted = true;
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> ActorId {
        // ActorId::new allocates monotonically; for test purposes we only
        // need distinct, orderable ids, so just create fresh ones.
        let _ = n;
        ActorId::new("T")
    }

    #[test]
    fn replays_previous_path_then_explores_fresh() {
        let mut strat = ExhaustiveStrategy::new();
        let mut rng = super::super::seeded_rng(1);
        let ready = vec![id(0), id(1)];
        strat.reset_for_iteration(0, &mut rng);
        let _ = strat.next_operation(&ready, 0, &mut rng);
        strat.on_iteration_complete();
        assert!(!strat.is_exhausted() || strat.previous_path.is_empty());
    }
}
