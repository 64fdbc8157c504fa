//! Fair-random exploration: uniform random choices for most of the run,
//! switching to strict round-robin once `max_fair_steps` is reached so that
//! every enabled operation is guaranteed to progress — the schedule shape
//! liveness checking needs (specification §4.6, §4.4).

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::id::ActorId;

use super::strategy::Strategy;

pub struct FairRandomStrategy {
    max_fair_steps: u64,
    round_robin_cursor: usize,
}

impl FairRandomStrategy {
    pub fn new(max_fair_steps: u64) -> Self {
        FairRandomStrategy {
            max_fair_steps,
            round_robin_cursor: 0,
        }
    }
}

impl Strategy for FairRandomStrategy {
    fn next_operation(&mut self, ready: &[ActorId], step: u64, rng: &mut ChaCha8Rng) -> ActorId {
        if step < self.max_fair_steps {
            let index = rng.gen_range(0, ready.len());
            ready[index].clone()
        } else {
            let mut sorted: Vec<&ActorId> = ready.iter().collect();
            sorted.sort_by_key(|id| id.index());
            let chosen = sorted[self.round_robin_cursor % sorted.len()].clone();
            self.round_robin_cursor += 1;
            chosen
        }
    }

    fn name(&self) -> &'static str {
        "fair-random"
    }

    fn reset_for_iteration(&mut self, _iteration: u64, _rng: &mut ChaCha8Rng) {
        self.round_robin_cursor = 0;
    }
}
