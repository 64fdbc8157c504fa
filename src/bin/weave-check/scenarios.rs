//! Bundled demo actor programs `weave-check` can drive under the testing
//! engine. Each is grounded in one of specification §8's Scenarios so that
//! `weave-check run <name>` is a runnable demonstration of the behavior that
//! section describes in prose.

use std::sync::Arc;

use weave::actor::{ActorOutcome, DispatchTable, TableActor};
use weave::id::EventGroup;
use weave::runtime::ControlledRuntime;
use weave::{ActorId, Runtime};

#[derive(Debug, Clone)]
struct Ping(ActorId);

#[derive(Debug, Clone, Copy)]
struct Pong;

#[derive(Debug, Clone, Copy)]
struct Start;

/// Scenario A: a client pings a server and asserts it gets the matching pong
/// back before halting.
fn ping_pong(runtime: &Arc<ControlledRuntime>) {
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
    let client = Box::new(TableActor::new((), client_table).with_initialize(
        move |_state, _initial, ctx| {
            let server_id = server_id.clone();
            async move {
                ctx.send(&server_id, Ping(ctx.self_id().clone()));
                Ok(())
            }
        },
    ));
    runtime.create_actor("Client", client, None, EventGroup::root());
}

/// Scenario F: a lone actor waits to receive an event nobody will ever send,
/// which the testing engine must report as a deadlock once every other
/// operation has quiesced.
fn deadlock(runtime: &Arc<ControlledRuntime>) {
    let table = DispatchTable::<()>::builder()
        .on::<Start, _, _>(|_state, _start, _group, ctx| async move {
            let _: Pong = ctx.receive().await;
            Ok(ActorOutcome::Continue)
        })
        .build();
    let entity = Box::new(
        TableActor::new((), table)
            .with_initialize(|_state, _initial, ctx| async move {
                ctx.send(ctx.self_id(), Start);
                Ok(())
            }),
    );
    runtime.create_actor("Lonely", entity, None, EventGroup::root());
}

/// A scenario entry point: builds its actor graph against a freshly minted
/// iteration's runtime. Called once per testing iteration.
pub type ScenarioFn = fn(&Arc<ControlledRuntime>);

/// Looks up a bundled scenario by name, for `weave-check run <name>`.
pub fn lookup(name: &str) -> Option<ScenarioFn> {
    match name {
        "ping-pong" => Some(ping_pong as ScenarioFn),
        "deadlock" => Some(deadlock as ScenarioFn),
        _ => None,
    }
}

/// The names `weave-check list` prints.
pub fn names() -> &'static [&'static str] {
    &["ping-pong", "deadlock"]
}
