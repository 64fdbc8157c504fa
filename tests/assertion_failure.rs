//! specification §4.8: `Assert(cond, msg)` is unconditionally fatal for the
//! iteration — an actor's `OnException` policy cannot swallow it, unlike an
//! ordinary thrown exception.

use std::sync::Arc;

use weave::actor::{ActorOutcome, DispatchTable, TableActor};
use weave::error::ExceptionHandlerResult;
use weave::id::EventGroup;
use weave::runtime::ControlledRuntime;
use weave::testing::{TestConfig, TestingEngine};
use weave::{ActorId, Runtime};

#[derive(Debug, Clone, Copy)]
struct Go;

fn entry(runtime: &Arc<ControlledRuntime>) {
    let table = DispatchTable::<()>::builder()
        .on::<Go, _, _>(|_state, _go, _group, ctx| async move {
            ctx.assert(false, "never true")?;
            Ok(ActorOutcome::Continue)
        })
        .build();
    // An exception policy that would swallow any ordinary action error —
    // proving the assertion bypasses it entirely.
    let actor =
        Box::new(TableActor::new((), table).with_exception_policy(|_state, _error| {
            ExceptionHandlerResult::HandledException
        }));
    let id = runtime.create_actor("A", actor, None, EventGroup::root());

    let driver = ActorId::new("Driver");
    runtime.send(&driver, None, &id, Box::new(Go), EventGroup::root());
}

#[tokio::test]
async fn assertion_failure_is_not_swallowed_by_on_exception() {
    let mut config = TestConfig::default_for_tests();
    config.iterations = 1;
    let engine = TestingEngine::new(config, entry);
    let result = engine.run().await;

    assert!(!result.passed());
    assert_eq!(result.bugs.len(), 1);
    assert_eq!(result.bugs[0].error, "never true");
}
