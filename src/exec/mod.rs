// src/exec/mod.rs

//! Task execution.
//!
//! - [`Executor`] is the seam the application drives: load a graph, request
//!   pipelines, wait for them.
//! - [`single_threaded`] provides the cooperative implementation used by the
//!   binary and the tests.
//! - [`context`] holds the per-pipeline and per-task state machine.
//! - [`report`] describes what a `wait` did.

pub mod context;
pub mod report;
pub mod single_threaded;

use crate::errors::Result;
use crate::framework::Framework;
use crate::graph::GraphOptions;
use crate::ids::PipelineId;

pub use context::{ExecContext, StateTable, TaskState};
pub use report::{FrameReport, StallReason, StalledPipeline};
pub use single_threaded::SingleThreadedExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub graph: GraphOptions,
    /// Restarts a looping pipeline may make before it is treated as runaway.
    pub max_loop_iterations: u32,
    /// Dump the state table at `debug` after every `wait`.
    pub log_state: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            graph: GraphOptions::default(),
            max_loop_iterations: 1024,
            log_state: false,
        }
    }
}

/// Drives a task graph built from a [`Framework`].
pub trait Executor {
    /// Build (or rebuild) the task graph. Required again after any structural
    /// change to the framework.
    fn load(&mut self, fw: &Framework) -> Result<()>;

    /// Request a top-level pipeline to run one cycle.
    fn run(&mut self, pipeline: PipelineId) -> Result<()>;

    /// Let a pipeline leave its wait-for-signal stage.
    fn signal(&mut self, pipeline: PipelineId) -> Result<()>;

    /// Run tasks until nothing more can progress.
    fn wait(&mut self, fw: &mut Framework) -> Result<FrameReport>;

    /// Whether any pipeline is still running or any task still queued.
    fn is_running(&self) -> bool;

    /// `run` each pipeline, then `wait`.
    fn run_frame(&mut self, fw: &mut Framework, pipelines: &[PipelineId]) -> Result<FrameReport> {
        for pipeline in pipelines {
            self.run(*pipeline)?;
        }
        self.wait(fw)
    }
}
