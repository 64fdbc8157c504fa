//! Scenario F (specification §8): two actors each wait to receive an event
//! nobody ever sends, and the engine reports it as a deadlock once every
//! other operation has quiesced.

use std::sync::Arc;

use weave::actor::{ActorOutcome, DispatchTable, TableActor};
use weave::id::EventGroup;
use weave::runtime::ControlledRuntime;
use weave::testing::{TestConfig, TestingEngine};

#[derive(Debug, Clone, Copy)]
struct Start;

#[derive(Debug, Clone, Copy)]
struct NeverSent;

fn entry(runtime: &Arc<ControlledRuntime>) {
    for name in ["A", "B"] {
        let table = DispatchTable::<()>::builder()
            .on::<Start, _, _>(|_state, _start, _group, ctx| async move {
                let _: NeverSent = ctx.receive().await;
                Ok(ActorOutcome::Continue)
            })
            .build();
        let actor = Box::new(
            TableActor::new((), table).with_initialize(|_state, _initial, ctx| async move {
                ctx.send(ctx.self_id(), Start);
                Ok(())
            }),
        );
        runtime.create_actor(name, actor, None, EventGroup::root());
    }
}

#[tokio::test]
async fn two_lonely_receivers_are_reported_as_a_deadlock() {
    let mut config = TestConfig::default_for_tests();
    config.iterations = 1;
    let engine = TestingEngine::new(config, entry);
    let result = engine.run().await;

    assert!(!result.passed());
    assert_eq!(result.bugs.len(), 1);
    let message = &result.bugs[0].error;
    assert_eq!(
        message,
        "Deadlock detected. A() and B() are waiting to receive an event, but no other controlled \
         tasks are enabled."
    );
}
