//! The bug report an iteration produces when it fails: the failing error,
//! the trace that led to it, and (specification §6) an XML graph of the
//! actors/states/transitions involved, emitted alongside the text trace by
//! the external testing CLI.

use crate::error::WeaveError;
use crate::testing::trace::TraceRecord;

/// One node in the replay graph: an actor and the state it was in (if any)
/// when the iteration ended.
#[derive(Debug, Clone)]
pub struct ActorGraphNode {
    pub actor: String,
    pub state: Option<String>,
}

/// The result of one failed testing iteration.
#[derive(Debug, Clone)]
pub struct BugReport {
    pub iteration: u64,
    pub seed: u64,
    pub strategy: String,
    pub error: String,
    pub trace: Vec<TraceRecord>,
    pub actors: Vec<ActorGraphNode>,
}

impl BugReport {
    pub fn new(
        iteration: u64,
        seed: u64,
        strategy: String,
        error: WeaveError,
        trace: Vec<TraceRecord>,
        actors: Vec<ActorGraphNode>,
    ) -> Self {
        BugReport {
            iteration,
            seed,
            strategy,
            error: error.to_string(),
            trace,
            actors,
        }
    }

    /// The replayable schedule: just the seed and strategy, since
    /// [`Scheduler`](crate::scheduler::Scheduler)'s strategies are fully
    /// determined by those two things plus the entry delegate
    /// (specification §8, "Determinism under replay").
    pub fn replay_command(&self, entry_point: &str) -> String {
        format!(
            "weave-check {} --strategy {} --seed {} --iterations 1",
            entry_point, self.strategy, self.seed
        )
    }

    /// The line-oriented trace, the stable format from §6.
    pub fn trace_text(&self) -> String {
        self.trace
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// A minimal XML actor graph: one `<actor>` element per entity alive at
    /// the time of failure, annotated with its last known state.
    pub fn actor_graph_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<ActorGraph>\n");
        for node in &self.actors {
            match &node.state {
                Some(state) => {
                    xml.push_str(&format!(
                        "  <Actor name=\"{}\" state=\"{}\" />\n",
                        xml_escape(&node.actor),
                        xml_escape(state)
                    ));
                }
                None => {
                    xml.push_str(&format!("  <Actor name=\"{}\" />\n", xml_escape(&node.actor)));
                }
            }
        }
        xml.push_str("</ActorGraph>\n");
        xml
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_graph_xml_escapes_attribute_values() {
        let report = BugReport::new(
            1,
            42,
            "random".into(),
            WeaveError::AssertionFailure("boom".into()),
            Vec::new(),
            vec![ActorGraphNode {
                actor: "A<B>".into(),
                state: Some("\"Init\"".into()),
            }],
        );
        let xml = report.actor_graph_xml();
        assert!(xml.contains("A&lt;B&gt;"));
        assert!(xml.contains("&quot;Init&quot;"));
    }

    #[test]
    fn replay_command_includes_seed_and_strategy() {
        let report = BugReport::new(
            3,
            7,
            "pct".into(),
            WeaveError::Deadlock {
                waiting: "A() and B()".into(),
            },
            Vec::new(),
            Vec::new(),
        );
        let command = report.replay_command("my_test");
        assert!(command.contains("--seed 7"));
        assert!(command.contains("--strategy pct"));
    }
}
