// tests/sessions.rs
use std::error::Error;

use stageflow::errors::StageflowError;
use stageflow::exec::Executor;
use stageflow::framework::{Arg, Framework, FrameworkLimits, Session, TaskDesc};
use stageflow::ids::DataId;
use stageflow::pipeline::{Container, Event, Pipeline};
use stageflow::types::ConflictPolicy;
use stageflow_test_utils::builders::loaded_executor;
use stageflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

/// One session adding a writer of its own slot on `stage`.
fn writer_session(
    fw: &mut Framework,
    name: &str,
    items: Pipeline<Container>,
    value: u32,
) -> Result<(Session, DataId), Box<dyn Error>> {
    let mut sb = fw.session(name);
    let slot = sb.data_emplace(Vec::<u32>::new())?;
    sb.task(
        TaskDesc::new()
            .name(format!("{name} writer"))
            .run_on(items.at(Container::Modify))
            .args([Arg::write(slot)])
            .func(move |args| -> anyhow::Result<()> {
                args.write::<Vec<u32>>(0)?.push(value);
                Ok(())
            }),
    )?;
    Ok((sb.finish(), slot))
}

#[test]
fn disjoint_writers_on_one_stage_in_either_order() -> TestResult {
    init_tracing();
    for swap in [false, true] {
        let mut fw = Framework::new();
        let items = fw.create_pipeline::<Container>("items")?;
        let (first, second) = if swap { ("b", "a") } else { ("a", "b") };
        let (_s1, slot1) = writer_session(&mut fw, first, items, 1)?;
        let (_s2, slot2) = writer_session(&mut fw, second, items, 2)?;

        let mut exec = loaded_executor(&fw, ConflictPolicy::Deny);
        for _ in 0..3 {
            let report = exec.run_frame(&mut fw, &[items.id()])?;
            assert_eq!(report.executed.len(), 2);
        }
        assert_eq!(fw.data_get::<Vec<u32>>(slot1)?, &vec![1, 1, 1]);
        assert_eq!(fw.data_get::<Vec<u32>>(slot2)?, &vec![2, 2, 2]);
    }
    Ok(())
}

#[test]
fn shared_slot_writers_are_rejected_until_ordered() -> TestResult {
    init_tracing();
    let mut fw = Framework::new();
    let items = fw.create_pipeline::<Container>("items")?;
    let shared = fw.data_emplace(0u32)?;
    fw.add_task(TaskDesc::new().name("w1").run_on(items.at(Container::Modify)).args([shared]))?;
    let w2 = fw
        .add_task(TaskDesc::new().name("w2").run_on(items.at(Container::Modify)).args([shared]))?
        .id;

    let mut exec = stageflow::exec::SingleThreadedExecutor::default();
    match exec.load(&fw) {
        Err(StageflowError::AccessConflict { data, .. }) => assert_eq!(data, shared),
        other => panic!("expected access conflict, got {other:?}"),
    }

    fw.remove_task(w2);
    fw.add_task(TaskDesc::new().name("w2").run_on(items.at(Container::Ready)).args([shared]))?;
    exec.load(&fw)?;
    Ok(())
}

#[test]
fn closing_a_session_removes_what_it_registered() -> TestResult {
    init_tracing();
    let mut fw = Framework::new();
    let items = fw.create_pipeline::<Container>("items")?;
    let (session, slot) = writer_session(&mut fw, "temp", items, 5)?;
    assert_eq!(session.tasks.len(), 1);
    assert_eq!(session.data, vec![slot]);

    let revision = fw.revision();
    fw.close_session(session);
    assert!(fw.revision() > revision);
    assert_eq!(fw.task_ids().count(), 0);
    assert!(!fw.data().contains(slot));

    // Freed ids are handed out again.
    let reused = fw.data_emplace(0u8)?;
    assert_eq!(reused, slot);
    Ok(())
}

#[test]
fn tasks_must_name_existing_ids_when_committed() -> TestResult {
    init_tracing();
    let mut fw = Framework::new();
    let main = fw.create_pipeline::<Event>("main")?;
    let gone = fw.data_emplace(0u8)?;
    fw.data_remove(gone);

    let err = fw
        .add_task(TaskDesc::new().name("t").run_on(main.at(Event::Run)).args([gone]))
        .unwrap_err();
    assert!(matches!(err, StageflowError::UnknownData { id, .. } if id == gone));

    let other = fw.create_pipeline::<Event>("other")?;
    fw.remove_pipeline(other.id());
    let err = fw
        .add_task(
            TaskDesc::new()
                .name("t")
                .run_on(main.at(Event::Run))
                .sync_with([other.at(Event::Done)]),
        )
        .unwrap_err();
    assert!(matches!(err, StageflowError::UnknownPipeline { .. }));
    Ok(())
}

#[test]
fn registries_enforce_their_limits() -> TestResult {
    init_tracing();
    let mut fw = Framework::with_limits(FrameworkLimits {
        max_data: 2,
        max_pipelines: 1,
        max_tasks: 1,
    });
    fw.data_create()?;
    fw.data_create()?;
    assert!(matches!(
        fw.data_create(),
        Err(StageflowError::IdCapacityExceeded { kind: "data", limit: 2 })
    ));

    let main = fw.create_pipeline::<Event>("main")?;
    assert!(matches!(
        fw.create_pipeline::<Event>("second"),
        Err(StageflowError::IdCapacityExceeded { .. })
    ));

    fw.add_task(TaskDesc::new().name("only").run_on(main.at(Event::Run)))?;
    assert!(matches!(
        fw.add_task(TaskDesc::new().name("extra").run_on(main.at(Event::Run))),
        Err(StageflowError::IdCapacityExceeded { kind: "task", .. })
    ));
    Ok(())
}
