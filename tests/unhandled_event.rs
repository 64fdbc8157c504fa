//! Scenario E (specification §8): an event with no matching handler and no
//! default action is reported as a bug, not silently dropped.

use std::sync::Arc;

use weave::actor::{DispatchTable, TableActor};
use weave::id::EventGroup;
use weave::runtime::ControlledRuntime;
use weave::testing::{TestConfig, TestingEngine};
use weave::{ActorId, Runtime};

#[derive(Debug, Clone, Copy)]
struct E;

fn entry(runtime: &Arc<ControlledRuntime>) {
    let table = DispatchTable::<()>::builder().build();
    let actor = Box::new(TableActor::new((), table));
    let id = runtime.create_actor("A", actor, None, EventGroup::root());

    let driver = ActorId::new("Driver");
    runtime.send(&driver, None, &id, Box::new(E), EventGroup::root());
}

#[tokio::test]
async fn unhandled_event_is_reported_as_a_bug() {
    let mut config = TestConfig::default_for_tests();
    config.iterations = 1;
    let engine = TestingEngine::new(config, entry);
    let result = engine.run().await;

    assert!(!result.passed());
    assert_eq!(result.bugs.len(), 1);
    let message = &result.bugs[0].error;
    let expected = format!(
        "A() received event '{}' that cannot be handled.",
        std::any::type_name::<E>()
    );
    assert_eq!(message, &expected);
}
