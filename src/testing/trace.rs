//! The trace log format from specification §6: a sequence of `<Tag>
//! payload` records, the stable interface external replay/debugging tools
//! consume.

use std::fmt;
use std::sync::Mutex;

/// The record tags named in specification §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    CreateLog,
    StateLog,
    ActionLog,
    SendLog,
    EnqueueLog,
    DequeueLog,
    GotoLog,
    MonitorLog,
    ErrorLog,
    StrategyLog,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tag::CreateLog => "CreateLog",
            Tag::StateLog => "StateLog",
            Tag::ActionLog => "ActionLog",
            Tag::SendLog => "SendLog",
            Tag::EnqueueLog => "EnqueueLog",
            Tag::DequeueLog => "DequeueLog",
            Tag::GotoLog => "GotoLog",
            Tag::MonitorLog => "MonitorLog",
            Tag::ErrorLog => "ErrorLog",
            Tag::StrategyLog => "StrategyLog",
        };
        f.write_str(name)
    }
}

/// One `<Tag> payload` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub tag: Tag,
    pub message: String,
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> {}", self.tag, self.message)
    }
}

/// An in-memory, append-only trace accumulated over one testing iteration.
/// Every call also forwards to `tracing` at `trace` level, so a live run can
/// be observed without waiting for the iteration to finish.
#[derive(Default)]
pub struct TraceLog {
    records: Mutex<Vec<TraceRecord>>,
}

impl TraceLog {
    pub fn new() -> Self {
        TraceLog {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn log(&self, tag: Tag, message: impl Into<String>) {
        let record = TraceRecord {
            tag,
            message: message.into(),
        };
        tracing::trace!(tag = %record.tag, message = %record.message, "trace record");
        self.records.lock().unwrap().push(record);
    }

    /// A snapshot of every record logged so far, in order.
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Renders the whole trace as line-oriented `<Tag> payload` text, the
    /// format specification §6 calls the stable interface for replay tools.
    pub fn render(&self) -> String {
        self.records()
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_produces_one_line_per_record() {
        let log = TraceLog::new();
        log.log(Tag::CreateLog, "Server(1) created");
        log.log(Tag::SendLog, "Client(2) sent Ping to Server(1)");
        let rendered = log.render();
        assert_eq!(rendered.lines().count(), 2);
        assert!(rendered.lines().next().unwrap().starts_with("<CreateLog>"));
    }
}
