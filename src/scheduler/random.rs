//! Uniform-random exploration strategy.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::id::ActorId;

use super::strategy::Strategy;

/// Picks uniformly among the enabled operations at every decision point.
/// The simplest strategy and a reasonable default for broad, shallow
/// exploration across many iterations.
#[derive(Debug, Default)]
pub struct RandomStrategy;

impl RandomStrategy {
    pub fn new() -> Self {
        RandomStrategy
    }
}

impl Strategy for RandomStrategy {
    fn next_operation(&mut self, ready: &[ActorId], _step: u64, rng: &mut ChaCha8Rng) -> ActorId {
        let index = rng.gen_range(0, ready.len());
        ready[index].clone()
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
