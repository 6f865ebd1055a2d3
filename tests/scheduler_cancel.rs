// tests/scheduler_cancel.rs
use std::error::Error;

use stageflow::exec::{Executor, TaskState};
use stageflow::framework::{Arg, Framework, TaskActions, TaskDesc};
use stageflow::ids::{DataId, PipelineId, TaskId};
use stageflow::pipeline::{Event, PipelineStage, StageRole, SyncMode, SyncWith};
use stageflow::types::ConflictPolicy;
use stageflow_test_utils::builders::{TraceLog, loaded_executor, stage_set};
use stageflow_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

const NEW: u8 = 0;
const CLEAR: u8 = 2;

struct Scenario {
    fw: Framework,
    items: PipelineId,
    consumer: PipelineId,
    inbox: DataId,
    queue: DataId,
    seen: DataId,
    schedule: TaskId,
    consume: TaskId,
    clear: TaskId,
}

/// `items` runs New, Modify, Clear. `schedule` moves the inbox into the queue
/// and schedules `items.New`, canceling when there is nothing to do.
/// `consume` runs on another pipeline and syncs on `items.New`.
fn scenario() -> Result<Scenario, Box<dyn Error>> {
    let mut fw = Framework::new();
    let stages = stage_set(
        "Items",
        &[
            ("New", StageRole::Gate),
            ("Modify", StageRole::Gate),
            ("Clear", StageRole::Clear),
        ],
    );
    let items = fw.create_pipeline_dyn("items", stages)?;
    let consumer = fw.create_pipeline::<Event>("consumer")?;

    let inbox = fw.data_emplace(Vec::<u32>::new())?;
    let queue = fw.data_emplace(Vec::<u32>::new())?;
    let seen = fw.data_emplace(Vec::<u32>::new())?;

    let schedule = fw
        .add_task(
            TaskDesc::new()
                .name("schedule items")
                .schedules(PipelineStage::new(items, NEW))
                .args([Arg::write(inbox), Arg::write(queue)])
                .func(|args| -> anyhow::Result<TaskActions> {
                    let mut inbox = args.write::<Vec<u32>>(0)?;
                    let mut queue = args.write::<Vec<u32>>(1)?;
                    queue.append(&mut inbox);
                    Ok(TaskActions::cancel_if(queue.is_empty()))
                }),
        )?
        .id;

    let consume = fw
        .add_task(
            TaskDesc::new()
                .name("consume items")
                .run_on(consumer.at(Event::Run))
                .sync_with([SyncWith {
                    target: PipelineStage::new(items, NEW),
                    mode: SyncMode::UseOrRun,
                }])
                .args([Arg::read(queue), Arg::write(seen)])
                .func(|args| -> anyhow::Result<()> {
                    let queue = args.read::<Vec<u32>>(0)?;
                    args.write::<Vec<u32>>(1)?.extend(queue.iter().copied());
                    Ok(())
                }),
        )?
        .id;

    let clear = fw
        .add_task(
            TaskDesc::new()
                .name("clear items")
                .run_on(PipelineStage::new(items, CLEAR))
                .args([queue])
                .func(|args| -> anyhow::Result<()> {
                    args.write::<Vec<u32>>(0)?.clear();
                    Ok(())
                }),
        )?
        .id;

    Ok(Scenario {
        fw,
        items,
        consumer: consumer.into(),
        inbox,
        queue,
        seen,
        schedule,
        consume,
        clear,
    })
}

#[test]
fn consumer_sees_exactly_the_scheduled_item() -> TestResult {
    init_tracing();
    let mut s = scenario()?;
    let mut exec = loaded_executor(&s.fw, ConflictPolicy::Deny);

    s.fw.data_get_mut::<Vec<u32>>(s.inbox)?.push(7);
    let report = exec.run_frame(&mut s.fw, &[s.items, s.consumer])?;

    assert!(report.is_complete());
    assert_eq!(report.executed, vec![s.schedule, s.consume, s.clear]);
    assert_eq!(s.fw.data_get::<Vec<u32>>(s.seen)?, &vec![7]);
    assert!(s.fw.data_get::<Vec<u32>>(s.queue)?.is_empty());
    Ok(())
}

#[test]
fn empty_queue_cancels_consumer_but_clear_still_runs() -> TestResult {
    init_tracing();
    let mut s = scenario()?;
    let mut exec = loaded_executor(&s.fw, ConflictPolicy::Deny);

    let report = exec.run_frame(&mut s.fw, &[s.items, s.consumer])?;

    assert!(report.is_complete());
    assert_eq!(report.times_executed(s.consume), 0);
    assert!(report.was_skipped(s.consume));
    assert_eq!(report.times_executed(s.clear), 1);
    assert_eq!(exec.context().task_state(s.consume), TaskState::Skipped);
    assert!(exec.context().is_canceled(s.items));
    assert!(s.fw.data_get::<Vec<u32>>(s.seen)?.is_empty());
    Ok(())
}

#[test]
fn next_cycle_after_cancel_runs_again() -> TestResult {
    init_tracing();
    let mut s = scenario()?;
    let mut exec = loaded_executor(&s.fw, ConflictPolicy::Deny);

    let report = exec.run_frame(&mut s.fw, &[s.items, s.consumer])?;
    assert!(report.was_skipped(s.consume));

    s.fw.data_get_mut::<Vec<u32>>(s.inbox)?.extend([1, 2]);
    let report = exec.run_frame(&mut s.fw, &[s.items, s.consumer])?;
    assert_eq!(report.times_executed(s.consume), 1);
    assert!(report.skipped.is_empty());
    assert!(!exec.context().is_canceled(s.items));
    assert_eq!(s.fw.data_get::<Vec<u32>>(s.seen)?, &vec![1, 2]);
    assert_eq!(exec.context().completed_cycles(s.items), 2);
    Ok(())
}

#[test]
fn consumer_uses_last_result_when_items_idle() -> TestResult {
    init_tracing();
    let mut s = scenario()?;
    let mut exec = loaded_executor(&s.fw, ConflictPolicy::Deny);

    s.fw.data_get_mut::<Vec<u32>>(s.queue)?.push(3);
    let report = exec.run_frame(&mut s.fw, &[s.consumer])?;
    assert_eq!(report.executed, vec![s.consume]);
    assert_eq!(s.fw.data_get::<Vec<u32>>(s.seen)?, &vec![3]);
    Ok(())
}

#[test]
fn cancel_skips_gate_dependents_on_other_pipelines() -> TestResult {
    init_tracing();
    let mut fw = Framework::new();
    let log = TraceLog::new(&mut fw);
    let work = fw.create_pipeline::<Event>("work")?;
    let other = fw.create_pipeline::<Event>("other")?;
    let cancel = fw.data_emplace(true)?;

    let decide = fw
        .add_task(
            TaskDesc::new()
                .name("decide")
                .schedules(work.at(Event::Schedule))
                .args([Arg::read(cancel)])
                .func(|args| -> anyhow::Result<TaskActions> {
                    Ok(TaskActions::cancel_if(*args.read::<bool>(0)?))
                }),
        )?
        .id;
    let run = fw.add_task(log.task("run").run_on(work.at(Event::Run)))?.id;
    let done = fw.add_task(log.task("done").run_on(work.at(Event::Done)))?.id;
    let dependent = fw
        .add_task(
            log.task("dependent")
                .run_on(other.at(Event::Run))
                .sync_with([work.at(Event::Run)]),
        )?
        .id;

    // `run` and `dependent` share the stage window and the log.
    let mut exec = loaded_executor(&fw, ConflictPolicy::Allow);

    let report = exec.run_frame(&mut fw, &[work.id(), other.id()])?;
    assert!(report.is_complete());
    assert_eq!(report.executed, vec![decide]);
    for t in [run, done, dependent] {
        assert!(report.was_skipped(t), "{t:?} not skipped");
    }
    assert!(log.entries(&fw).is_empty());

    *fw.data_get_mut::<bool>(cancel)? = false;
    let report = exec.run_frame(&mut fw, &[work.id(), other.id()])?;
    assert!(report.skipped.is_empty());
    assert_eq!(log.entries(&fw), vec!["dependent", "run", "done"]);
    Ok(())
}
