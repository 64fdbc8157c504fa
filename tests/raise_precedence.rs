//! Scenario C (specification §8): an action that raises an event gets that
//! event dispatched before the actor falls back to a pre-enqueued one.

use std::sync::{Arc, Mutex};

use weave::actor::{ActorOutcome, DispatchTable, TableActor};
use weave::id::EventGroup;
use weave::runtime::ControlledRuntime;
use weave::testing::{TestConfig, TestingEngine};
use weave::{ActorId, Runtime};

#[derive(Debug, Clone, Copy)]
struct A;

#[derive(Debug, Clone, Copy)]
struct R;

#[derive(Debug, Clone, Copy)]
struct B;

type Log = Arc<Mutex<Vec<&'static str>>>;

#[tokio::test]
async fn raised_event_is_dispatched_before_a_pre_enqueued_one() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let log_for_entry = log.clone();

    let entry = move |runtime: &Arc<ControlledRuntime>| {
        let table = DispatchTable::<Log>::builder()
            .on::<A, _, _>(|state, _a, _group, ctx| {
                state.lock().unwrap().push("A");
                async move {
                    ctx.raise(R)?;
                    Ok(ActorOutcome::Continue)
                }
            })
            .on::<R, _, _>(|state, _r, _group, _ctx| {
                state.lock().unwrap().push("R");
                async move { Ok(ActorOutcome::Continue) }
            })
            .on::<B, _, _>(|state, _b, _group, _ctx| {
                state.lock().unwrap().push("B");
                async move { Ok(ActorOutcome::Halt) }
            })
            .build();
        let actor = Box::new(TableActor::new(log_for_entry.clone(), table));
        let id = runtime.create_actor("Machine", actor, None, EventGroup::root());

        let driver = ActorId::new("Driver");
        runtime.send(&driver, None, &id, Box::new(A), EventGroup::root());
        runtime.send(&driver, None, &id, Box::new(B), EventGroup::root());
    };

    let mut config = TestConfig::default_for_tests();
    config.iterations = 1;
    let engine = TestingEngine::new(config, entry);
    let result = engine.run().await;

    assert!(result.passed(), "unexpected bugs: {:?}", result.bugs);
    assert_eq!(*log.lock().unwrap(), vec!["A", "R", "B"]);
}
