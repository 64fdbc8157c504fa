//! Probabilistic Concurrency Testing (PCT): priority-based scheduling with
//! a bounded number of priority-change points per schedule.
//!
//! Each operation is assigned a priority the first time it's seen; at each
//! decision point the highest-priority enabled operation runs. At a small,
//! bounded number of randomly-chosen steps, the currently-scheduled
//! operation's priority is demoted to the bottom of the order. This is the
//! standard PCT construction: it finds bugs of a given "depth" (number of
//! ordering constraints that must be violated) with probability bounded
//! below by a polynomial in the program size, using far fewer priority
//! changes than there are possible interleavings.

use std::collections::HashMap;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::id::ActorId;

use super::strategy::Strategy;

pub struct PctStrategy {
    max_priority_changes: usize,
    priorities: HashMap<ActorId, i64>,
    next_priority: i64,
    demotions_used: usize,
    steps_until_next_change: u64,
}

impl PctStrategy {
    pub fn new(max_priority_changes: usize) -> Self {
        PctStrategy {
            max_priority_changes,
            priorities: HashMap::new(),
            next_priority: 0,
            demotions_used: 0,
            steps_until_next_change: 0,
        }
    }

    fn priority_of(&mut self, id: &ActorId) -> i64 {
        if let Some(p) = self.priorities.get(id) {
            return *p;
        }
        self.next_priority += 1;
        self.priorities.insert(id.clone(), self.next_priority);
        self.next_priority
    }
}

impl Strategy for PctStrategy {
    fn next_operation(&mut self, ready: &[ActorId], _step: u64, rng: &mut ChaCha8Rng) -> ActorId {
        for id in ready {
            self.priority_of(id);
        }
        let chosen = ready
            .iter()
            .min_by_key(|id| self.priorities[*id])
            .cloned()
            .expect("ready is never empty when next_operation is called");

        if self.demotions_used < self.max_priority_changes {
            if self.steps_until_next_change == 0 {
                self.next_priority += 1;
                self.priorities.insert(chosen.clone(), self.next_priority);
                self.demotions_used += 1;
                self.steps_until_next_change = rng.gen_range(1, 8);
            } else {
                self.steps_until_next_change -= 1;
            }
        }

        chosen
    }

    fn name(&self) -> &'static str {
        "pct"
    }

    fn reset_for_iteration(&mut self, _iteration: u64, rng: &mut ChaCha8Rng) {
        self.priorities.clear();
        self.next_priority = 0;
        self.demotions_used = 0;
        self.steps_until_next_change = rng.gen_range(1, 8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_configured_priority_changes() {
        let mut strat = PctStrategy::new(2);
        let mut rng = super::super::seeded_rng(7);
        let a = ActorId::new("A");
        let b = ActorId::new("B");
        let ready = vec![a.clone(), b.clone()];
        strat.reset_for_iteration(0, &mut rng);
        for step in 0..50 {
            strat.next_operation(&ready, step, &mut rng);
        }
        assert!(strat.demotions_used <= 2);
    }
}
