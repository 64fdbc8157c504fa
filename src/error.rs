//! The error taxonomy from specification §7, plus the narrower
//! `UserError`/`ExceptionHandlerResult` pair used by actor and state-machine
//! actions.
//!
//! Core operations never return these as a `Result` for ordinary control
//! flow (§7: "core operations never return error codes for normal flow");
//! instead they are delivered through a [`FailureSink`]. The one place a
//! `Result` *is* the right shape is a user action itself, which may fail
//! with an arbitrary [`UserError`] that the actor's exception policy then
//! reduces to one of `HandledException`, `HaltMachine`, or `ThrowException`.

use std::fmt;

use crate::id::ActorId;

/// The fatal error categories a [`FailureSink`] receives. Every variant's
/// `Display` implementation matches the message template spec.md gives for
/// it verbatim, since those strings are asserted on in trace output and
/// bug reports.
#[derive(Debug, thiserror::Error)]
pub enum WeaveError {
    /// `Assert(cond, msg)` was hit with `cond` false.
    #[error("{0}")]
    AssertionFailure(String),

    /// No handler and no default action was found for an event. `actor` is
    /// already the bare `Name()` label spec.md's template uses — not
    /// `ActorId`'s `Name(index)` `Display`, which would double up the
    /// parentheses.
    #[error("{actor} received event '{event_type}' that cannot be handled.")]
    UnhandledEvent { actor: String, event_type: String },

    /// All operations blocked, none advanceable, no timers outstanding.
    #[error(
        "Deadlock detected. {waiting} are waiting to receive an event, but no other controlled \
         tasks are enabled."
    )]
    Deadlock { waiting: String },

    /// A monitor stayed in a hot state beyond the configured temperature
    /// threshold under a fair schedule.
    #[error("Monitor detected potential liveness bug in hot state '{hot_state}'.")]
    LivenessViolation { hot_state: String },

    /// A runtime precondition was violated by user code (e.g. send to an
    /// uninitialized id, a second raise in the same action, two
    /// simultaneous transitions).
    #[error("{0}")]
    InvariantViolation(String),

    /// A user action threw and the actor's `OnException` policy decided the
    /// exception should surface as a bug.
    #[error("unhandled exception in {actor}: {source}")]
    UserException {
        actor: ActorId,
        #[source]
        source: UserError,
    },
}

/// An error raised by user action code. Opaque to the runtime beyond what
/// `anyhow` gives us; the actor's `on_exception` hook decides its fate.
pub type UserError = anyhow::Error;

/// The three outcomes an actor's exception policy may choose for a failed
/// action, per §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionHandlerResult {
    /// Swallow the exception; the actor keeps running.
    HandledException,
    /// Swallow the exception but halt the actor (as if `HaltEvent` had been
    /// raised).
    HaltMachine,
    /// Let it surface as a bug — the only other way a runtime exception can
    /// end up in the failure channel.
    ThrowException,
}

impl fmt::Display for ExceptionHandlerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExceptionHandlerResult::HandledException => "HandledException",
            ExceptionHandlerResult::HaltMachine => "HaltMachine",
            ExceptionHandlerResult::ThrowException => "ThrowException",
        };
        f.write_str(label)
    }
}

/// Sink for fatal failures (§7). Tests record the first failure per
/// iteration and suppress subsequent ones; a production deployment reports
/// every failure it sees (typically just logging and carrying on).
pub trait FailureSink: Send + Sync {
    fn report(&self, error: WeaveError);
}

/// A `FailureSink` that logs every failure via `tracing` and otherwise
/// ignores it — the production default.
#[derive(Debug, Default)]
pub struct LoggingFailureSink;

impl FailureSink for LoggingFailureSink {
    fn report(&self, error: WeaveError) {
        tracing::error!(%error, "unhandled failure reported to OnFailure");
    }
}

/// A `FailureSink` that records only the first failure it sees, per §7's
/// "tests record the first failure per iteration; subsequent errors in the
/// same iteration are suppressed".
#[derive(Debug, Default)]
pub struct FirstFailureSink {
    first: std::sync::Mutex<Option<WeaveError>>,
}

impl FirstFailureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Option<WeaveError> {
        self.first.lock().unwrap().take()
    }

    pub fn has_failed(&self) -> bool {
        self.first.lock().unwrap().is_some()
    }
}

impl FailureSink for FirstFailureSink {
    fn report(&self, error: WeaveError) {
        let mut slot = self.first.lock().unwrap();
        if slot.is_none() {
            tracing::warn!(%error, "iteration failed");
            *slot = Some(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhandled_event_message_matches_spec_template() {
        let err = WeaveError::UnhandledEvent {
            actor: "A()".to_string(),
            event_type: "E".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "A() received event 'E' that cannot be handled."
        );
    }

    #[test]
    fn deadlock_message_matches_spec_template() {
        let err = WeaveError::Deadlock {
            waiting: "A() and B()".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Deadlock detected. A() and B() are waiting to receive an event, but no other \
             controlled tasks are enabled."
        );
    }

    #[test]
    fn first_failure_sink_suppresses_subsequent_reports() {
        let sink = FirstFailureSink::new();
        sink.report(WeaveError::AssertionFailure("first".into()));
        sink.report(WeaveError::AssertionFailure("second".into()));
        let taken = sink.take().unwrap();
        assert_eq!(taken.to_string(), "first");
    }
}
