// src/lib.rs

//! Data-flow task scheduler with staged pipelines and explicit
//! synchronization barriers.
//!
//! Sessions register data slots, pipelines and tasks on a
//! [`framework::Framework`]; [`graph::TaskGraph::build`] validates the result
//! and fixes a cycle-free order; an [`exec::Executor`] runs it frame by frame.

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod framework;
pub mod graph;
pub mod ids;
pub mod logging;
pub mod pipeline;
pub mod scene;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, default_config_path, load_and_validate, load_or_default};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, TickerPlan, spawn_frame_ticker};

/// High-level entry point used by `main.rs`.
///
/// Loads the config, builds the demo scene and its task graph, then either
/// prints the graph (`--dry-run`) or runs the frame loop until the ticker
/// finishes or Ctrl-C arrives.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = match &args.config {
        Some(path) => load_and_validate(PathBuf::from(path))?,
        None => load_or_default(default_config_path())?,
    };

    let options = RuntimeOptions {
        executor: cfg.executor_options(),
        limits: cfg.limits(),
        scene: cfg.scene_settings(),
    };
    let core = CoreRuntime::new(options)?;

    if args.dry_run {
        print_dry_run(&cfg, &core);
        return Ok(());
    }

    let plan = TickerPlan {
        frames: args.frames.unwrap_or(cfg.app.frames),
        frame_rate: cfg.app.frame_rate,
        attach_at: Some(args.attach_at.unwrap_or(cfg.app.attach_at)),
    };
    info!(frames = plan.frames, frame_rate = plan.frame_rate, "starting frame loop");

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);

    // Ctrl-C -> graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let _ticker = spawn_frame_ticker(rt_tx, plan);

    let summary = Runtime::new(core, rt_rx).run().await?;
    info!(
        frames = summary.frames,
        executed = summary.tasks_executed,
        skipped = summary.tasks_skipped,
        stalled_frames = summary.stalled_frames,
        "done"
    );
    Ok(())
}

fn print_dry_run(cfg: &ConfigFile, core: &CoreRuntime) {
    println!("stageflow dry-run");
    println!("  executor.conflict_policy = {}", cfg.executor.conflict_policy);
    println!("  executor.max_loop_iterations = {}", cfg.executor.max_loop_iterations);
    println!("  app.frames = {}", cfg.app.frames);
    println!();
    if let Some(graph) = core.graph() {
        print!("{graph}");
    }
    debug!("dry-run complete (no execution)");
}
