//! Scenario B (specification §8): an event deferred in one state is left in
//! the FIFO until a transition reaches a state that handles it.

use std::sync::{Arc, Mutex};

use weave::id::EventGroup;
use weave::runtime::ControlledRuntime;
use weave::state_machine::{StateMachine, Transition};
use weave::testing::{TestConfig, TestingEngine};
use weave::{ActorId, Runtime};

#[derive(Debug, Clone, Copy)]
struct Go;

#[derive(Debug, Clone, Copy)]
struct E;

type Log = Arc<Mutex<Vec<&'static str>>>;

fn build_machine(log: Log) -> StateMachine<Log> {
    StateMachine::builder()
        .state("Init", |s| {
            s.defer::<E>().on::<Go, _, _>(|state, _go, _group, _ctx| {
                let state = state.clone();
                async move {
                    state.lock().unwrap().push("Go");
                    Ok(Transition::Goto("Active"))
                }
            })
        })
        .state("Active", |s| {
            s.on::<E, _, _>(|state, _e, _group, _ctx| {
                let state = state.clone();
                async move {
                    state.lock().unwrap().push("E");
                    Ok(Transition::Halt)
                }
            })
        })
        .build("Init", log)
}

#[tokio::test]
async fn deferred_event_is_handled_only_after_the_transition() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let log_for_entry = log.clone();

    let entry = move |runtime: &Arc<ControlledRuntime>| {
        let machine = Box::new(build_machine(log_for_entry.clone()));
        let id = runtime.create_actor("Machine", machine, None, EventGroup::root());
        let driver = ActorId::new("Driver");
        runtime.send(&driver, None, &id, Box::new(E), EventGroup::root());
        runtime.send(&driver, None, &id, Box::new(Go), EventGroup::root());
    };

    let mut config = TestConfig::default_for_tests();
    config.iterations = 1;
    let engine = TestingEngine::new(config, entry);
    let result = engine.run().await;

    assert!(result.passed(), "unexpected bugs: {:?}", result.bugs);
    assert_eq!(*log.lock().unwrap(), vec!["Go", "E"]);
}
