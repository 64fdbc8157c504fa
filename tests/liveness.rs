//! Scenario G (specification §8): a monitor stuck in a hot state for more
//! than the configured number of consecutive scheduled steps is reported as
//! a potential liveness bug, even though nothing ever deadlocks.

use std::sync::Arc;

use weave::actor::{ActorOutcome, DispatchTable, TableActor};
use weave::id::EventGroup;
use weave::monitor::{Monitor, MonitorOutcome};
use weave::runtime::ControlledRuntime;
use weave::testing::{TestConfig, TestingEngine};

#[derive(Debug, Clone, Copy)]
struct Start;

#[derive(Debug, Clone, Copy)]
struct Done;

#[derive(Debug, Clone, Copy)]
struct Tick;

fn build_monitor() -> Monitor<()> {
    Monitor::builder()
        .state("Idle", |s| {
            s.on::<Start, _>(|_state, _start| Ok(MonitorOutcome::Goto("Busy".into())))
        })
        .state("Busy", |s| {
            s.hot()
                .on::<Done, _>(|_state, _done| Ok(MonitorOutcome::Goto("Idle".into())))
        })
        .build("Idle", ())
}

fn entry(runtime: &Arc<ControlledRuntime>) {
    let table = DispatchTable::<()>::builder()
        .on::<Tick, _, _>(|_state, _tick, _group, ctx| async move {
            ctx.send(ctx.self_id(), Tick);
            Ok(ActorOutcome::Continue)
        })
        .build();
    let actor = Box::new(
        TableActor::new((), table).with_initialize(|_state, _initial, ctx| async move {
            ctx.monitor::<(), _>(Start);
            ctx.send(ctx.self_id(), Tick);
            Ok(())
        }),
    );
    runtime.create_actor("Workload", actor, None, EventGroup::root());
}

#[tokio::test]
async fn monitor_stuck_hot_is_reported_as_a_liveness_bug() {
    let mut config = TestConfig::default_for_tests();
    config.iterations = 1;
    config.liveness_temperature_threshold = 3;
    let engine = TestingEngine::new(config, entry).with_monitor(build_monitor);
    let result = engine.run().await;

    assert!(!result.passed());
    assert_eq!(result.bugs.len(), 1);
    let message = &result.bugs[0].error;
    assert!(
        message.contains("potential liveness bug in hot state 'Busy'"),
        "{}",
        message
    );
}
