//! # weave
//!
//! A library for building actor-style, message-driven programs and
//! systematically testing them against concurrency bugs: deadlocks,
//! unhandled events, assertion failures, and liveness violations that only
//! show up under specific schedules.
//!
//! An actor ([`actor::TableActor`] or the hierarchical
//! [`state_machine::StateMachine`]) owns a private [`queue::EventQueue`] and
//! reacts to events delivered through a [`runtime::Runtime`] — either the
//! [`runtime::ControlledRuntime`] [`testing::TestingEngine`] uses to replay
//! the same program under many interleavings and nondeterministic choices,
//! or the [`runtime::ProductionRuntime`] that actually runs it.
//! [`monitor::Monitor`] watches the resulting event stream for safety and
//! liveness properties without taking part in the actor graph itself.
//!
//! Most programs only need three modules directly: [`event`] to declare
//! message types, [`actor`] or [`state_machine`] to define behavior, and
//! [`testing`] to drive it under test.

#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]

pub mod actor;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod hooks;
pub mod id;
pub mod monitor;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod state_machine;
pub mod testing;

pub use actor::{ActorOutcome, DispatchTable, Entity, TableActor};
pub use context::ActorContext;
pub use error::{ExceptionHandlerResult, UserError, WeaveError};
pub use event::{downcast_event, BoxedEvent, DefaultEvent, Event, HaltEvent, WildCardEvent};
pub use id::{ActorId, EventGroup};
pub use monitor::Monitor;
pub use runtime::{ControlledRuntime, ProductionRuntime, Runtime};
pub use state_machine::{StateMachine, Transition};
pub use testing::{ReplayOutcome, TestConfig, TestingEngine, TestingResult};
