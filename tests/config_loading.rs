// tests/config_loading.rs
use std::error::Error;
use std::io::Write;

use stageflow::config::{load_and_validate, load_or_default};
use stageflow::errors::StageflowError;
use stageflow::types::ConflictPolicy;
use stageflow_test_utils::builders::ConfigFileBuilder;
use stageflow_test_utils::init_tracing;
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

fn config_file(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn full_config_round_trips_into_options() -> TestResult {
    init_tracing();
    let file = config_file(
        r#"
[executor]
conflict_policy = "warn"
max_loop_iterations = 16
log_state = true

[limits]
max_data = 100
max_pipelines = 10
max_tasks = 50

[app]
frames = 7
frame_rate = 0.0
spawn_per_frame = 4
attach_at = 3
"#,
    )?;

    let cfg = load_and_validate(file.path())?;
    let exec = cfg.executor_options();
    assert_eq!(exec.graph.conflict_policy, ConflictPolicy::Warn);
    assert_eq!(exec.max_loop_iterations, 16);
    assert!(exec.log_state);
    assert_eq!(cfg.limits().max_tasks, 50);
    assert_eq!(cfg.app.frames, 7);
    assert_eq!(cfg.app.attach_at, 3);
    assert_eq!(cfg.scene_settings().spawn_per_frame, 4);
    Ok(())
}

#[test]
fn missing_sections_use_defaults() -> TestResult {
    init_tracing();
    let file = config_file("[app]\nframes = 5\n")?;
    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.app.frames, 5);
    assert_eq!(cfg.app.frame_rate, 60.0);
    assert_eq!(cfg.executor.conflict_policy, ConflictPolicy::Deny);
    assert_eq!(cfg.limits().max_pipelines, 4096);
    Ok(())
}

#[test]
fn malformed_toml_is_a_toml_error() -> TestResult {
    init_tracing();
    let file = config_file("[executor\nconflict_policy = ")?;
    assert!(matches!(load_and_validate(file.path()), Err(StageflowError::Toml(_))));
    Ok(())
}

#[test]
fn unknown_policy_and_keys_are_rejected() -> TestResult {
    init_tracing();
    let file = config_file("[executor]\nconflict_policy = \"maybe\"\n")?;
    assert!(matches!(load_and_validate(file.path()), Err(StageflowError::Toml(_))));

    let file = config_file("[executor]\nconflict = \"deny\"\n")?;
    assert!(matches!(load_and_validate(file.path()), Err(StageflowError::Toml(_))));
    Ok(())
}

#[test]
fn zero_limits_are_config_errors() -> TestResult {
    init_tracing();
    for key in ["max_data", "max_pipelines", "max_tasks"] {
        let file = config_file(&format!("[limits]\n{key} = 0\n"))?;
        match load_and_validate(file.path()) {
            Err(StageflowError::Config(msg)) => assert!(msg.contains(key), "{msg}"),
            other => panic!("expected config error for {key}, got {other:?}"),
        }
    }

    let raw = ConfigFileBuilder::new().frames(0).raw();
    assert!(matches!(
        stageflow::config::ConfigFile::try_from(raw),
        Err(StageflowError::Config(_))
    ));
    Ok(())
}

#[test]
fn negative_frame_rate_is_rejected() -> TestResult {
    init_tracing();
    let file = config_file("[app]\nframe_rate = -5.0\n")?;
    assert!(matches!(load_and_validate(file.path()), Err(StageflowError::Config(_))));
    Ok(())
}

#[test]
fn implicit_default_path_may_be_missing() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("Stageflow.toml");

    let cfg = load_or_default(&missing)?;
    assert_eq!(cfg.app.frames, 120);

    assert!(matches!(load_and_validate(&missing), Err(StageflowError::Io(_))));
    Ok(())
}
