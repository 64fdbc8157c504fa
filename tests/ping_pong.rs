//! Scenario A (specification §8): a client pings a server and gets exactly
//! one pong back before both actors halt cleanly.

use std::sync::Arc;

use weave::actor::{ActorOutcome, DispatchTable, TableActor};
use weave::id::EventGroup;
use weave::runtime::ControlledRuntime;
use weave::testing::{TestConfig, TestingEngine};
use weave::ActorId;

#[derive(Debug, Clone)]
struct Ping(ActorId);

#[derive(Debug, Clone, Copy)]
struct Pong;

fn entry(runtime: &Arc<ControlledRuntime>) {
    let server_table = DispatchTable::<()>::builder()
        .on::<Ping, _, _>(|_state, ping, _group, ctx| async move {
            ctx.send(&ping.0, Pong);
            Ok(ActorOutcome::Continue)
        })
        .build();
    let server = Box::new(TableActor::new((), server_table));
    let server_id = runtime.create_actor("Server", server, None, EventGroup::root());

    let client_table = DispatchTable::<()>::builder()
        .on::<Pong, _, _>(|_state, _pong, _group, ctx| async move {
            ctx.assert(true, "client received the expected pong")?;
            Ok(ActorOutcome::Halt)
        })
        .build();
    let client = Box::new(
        TableActor::new((), client_table).with_initialize(move |_state, _initial, ctx| {
            let server_id = server_id.clone();
            async move {
                ctx.send(&server_id, Ping(ctx.self_id().clone()));
                Ok(())
            }
        }),
    );
    runtime.create_actor("Client", client, None, EventGroup::root());
}

#[tokio::test]
async fn client_receives_exactly_one_pong_and_both_actors_halt() {
    let mut config = TestConfig::default_for_tests();
    config.iterations = 5;
    let engine = TestingEngine::new(config, entry);
    let result = engine.run().await;

    assert!(result.passed(), "unexpected bugs: {:?}", result.bugs);
    assert_eq!(result.iterations_run, 5);
}
