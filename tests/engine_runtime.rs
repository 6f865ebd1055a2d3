// tests/engine_runtime.rs
use std::error::Error;

use stageflow::engine::{
    CoreCommand, CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, TickerPlan, spawn_frame_ticker,
};
use stageflow::errors::StageflowError;
use stageflow::types::ConflictPolicy;
use stageflow_test_utils::builders::ConfigFileBuilder;
use stageflow_test_utils::{init_tracing, with_timeout};
use tokio::sync::mpsc;

type TestResult = Result<(), Box<dyn Error>>;

fn options_from_config() -> RuntimeOptions {
    let cfg = ConfigFileBuilder::new()
        .conflict_policy(ConflictPolicy::Deny)
        .frames(6)
        .build();
    RuntimeOptions {
        executor: cfg.executor_options(),
        limits: cfg.limits(),
        scene: cfg.scene_settings(),
    }
}

#[tokio::test]
async fn throttled_ticker_runs_every_frame() -> TestResult {
    with_timeout(async {
        init_tracing();
        let core = CoreRuntime::new(options_from_config())?;
        let (tx, rx) = mpsc::channel(4);
        let ticker = spawn_frame_ticker(
            tx,
            TickerPlan {
                frames: 6,
                frame_rate: 200.0,
                attach_at: Some(3),
            },
        );

        let summary = Runtime::new(core, rx).run().await?;
        ticker.await?;
        assert_eq!(summary.frames, 6);
        assert_eq!(summary.stalled_frames, 0);
        Ok::<_, Box<dyn Error>>(())
    })
    .await
}

#[tokio::test]
async fn shutdown_before_frames_exits_cleanly() -> TestResult {
    with_timeout(async {
        init_tracing();
        let core = CoreRuntime::new(options_from_config())?;
        let (tx, rx) = mpsc::channel(4);
        tx.send(RuntimeEvent::ShutdownRequested).await?;
        tx.send(RuntimeEvent::FrameRequested { dt: 0.1 }).await?;

        let summary = Runtime::new(core, rx).run().await?;
        assert_eq!(summary.frames, 0);
        Ok::<_, Box<dyn Error>>(())
    })
    .await
}

#[test]
fn core_reports_each_frame_number() -> TestResult {
    init_tracing();
    let mut core = CoreRuntime::new(options_from_config())?;
    for expected in 1..=3 {
        let step = core.step(RuntimeEvent::FrameRequested { dt: 1.0 / 60.0 })?;
        assert!(matches!(
            step.commands.as_slice(),
            [CoreCommand::FrameCompleted { frame, .. }] if *frame == expected
        ));
    }
    Ok(())
}

#[test]
fn tiny_task_limit_fails_at_startup() {
    init_tracing();
    let mut options = options_from_config();
    options.limits.max_tasks = 3;
    assert!(matches!(
        CoreRuntime::new(options),
        Err(StageflowError::IdCapacityExceeded { kind: "task", .. })
    ));
}
