//! Scenario D (specification §8): a predicate-narrowed `receive` skips a
//! queued event that doesn't satisfy it, leaving that event for later
//! ordinary dispatch.

use std::sync::{Arc, Mutex};

use weave::actor::{ActorOutcome, DispatchTable, TableActor};
use weave::id::EventGroup;
use weave::runtime::ControlledRuntime;
use weave::testing::{TestConfig, TestingEngine};
use weave::{ActorId, Runtime};

#[derive(Debug, Clone, Copy)]
struct StartReceive;

#[derive(Debug, Clone, Copy)]
struct Ev(bool);

type Log = Arc<Mutex<Vec<&'static str>>>;

#[tokio::test]
async fn receive_with_predicate_skips_the_non_matching_queued_event() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let log_for_entry = log.clone();

    let entry = move |runtime: &Arc<ControlledRuntime>| {
        let table = DispatchTable::<Log>::builder()
            .on::<StartReceive, _, _>(|state, _start, _group, ctx| {
                let state = state.clone();
                async move {
                    let received: Ev = ctx.receive_where(|e: &Ev| e.0).await;
                    state.lock().unwrap().push(if received.0 {
                        "received-true"
                    } else {
                        "received-false"
                    });
                    Ok(ActorOutcome::Continue)
                }
            })
            .on::<Ev, _, _>(|state, ev, _group, _ctx| {
                state
                    .lock()
                    .unwrap()
                    .push(if ev.0 { "dispatched-true" } else { "dispatched-false" });
                async move { Ok(ActorOutcome::Halt) }
            })
            .build();
        let actor = Box::new(TableActor::new(log_for_entry.clone(), table));
        let id = runtime.create_actor("Machine", actor, None, EventGroup::root());

        let driver = ActorId::new("Driver");
        runtime.send(&driver, None, &id, Box::new(StartReceive), EventGroup::root());
        runtime.send(&driver, None, &id, Box::new(Ev(false)), EventGroup::root());
        runtime.send(&driver, None, &id, Box::new(Ev(true)), EventGroup::root());
    };

    let mut config = TestConfig::default_for_tests();
    config.iterations = 1;
    let engine = TestingEngine::new(config, entry);
    let result = engine.run().await;

    assert!(result.passed(), "unexpected bugs: {:?}", result.bugs);
    assert_eq!(*log.lock().unwrap(), vec!["received-true", "dispatched-false"]);
}
