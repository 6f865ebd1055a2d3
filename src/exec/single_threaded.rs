// src/exec/single_threaded.rs

use tracing::{debug, info, trace, warn};

use crate::errors::{Result, StageflowError};
use crate::exec::context::{ExecContext, StateTable};
use crate::exec::report::{FrameReport, StallReason};
use crate::exec::{Executor, ExecutorOptions};
use crate::framework::{Framework, TaskActions};
use crate::graph::TaskGraph;
use crate::ids::{PipelineId, TaskId};

/// Cooperative executor: one task at a time, in a deterministic order.
///
/// Ready tasks run first-in first-out. A task is queued when the stage it runs
/// on is entered and becomes ready once every stage it syncs with is open.
#[derive(Debug, Default)]
pub struct SingleThreadedExecutor {
    options: ExecutorOptions,
    graph: Option<TaskGraph>,
    ctx: ExecContext,
}

impl SingleThreadedExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self {
            options,
            graph: None,
            ctx: ExecContext::default(),
        }
    }

    pub fn graph(&self) -> Option<&TaskGraph> {
        self.graph.as_ref()
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    /// State table of the loaded graph, if any.
    pub fn state_table(&self) -> Option<StateTable<'_>> {
        self.graph.as_ref().map(|g| self.ctx.state_table(g))
    }

    fn loaded(&self) -> Result<&TaskGraph> {
        self.graph.as_ref().ok_or(StageflowError::GraphNotLoaded)
    }
}

impl Executor for SingleThreadedExecutor {
    fn load(&mut self, fw: &Framework) -> Result<()> {
        let graph = TaskGraph::build(fw, &self.options.graph)?;
        if self.ctx.is_busy() {
            warn!("reloading task graph while pipelines were running; their state is dropped");
        }
        self.ctx = ExecContext::new(&graph, self.options.max_loop_iterations);
        debug!(revision = graph.revision(), "task graph loaded");
        self.graph = Some(graph);
        Ok(())
    }

    fn run(&mut self, pipeline: PipelineId) -> Result<()> {
        let graph = self.graph.as_ref().ok_or(StageflowError::GraphNotLoaded)?;
        let Some(node) = graph.pipeline(pipeline) else {
            return Err(StageflowError::UnknownPipeline {
                id: pipeline,
                context: "run".to_string(),
            });
        };
        if node.parent.is_some() {
            warn!(pipeline = %node.name, "run ignored: child pipelines only run inside their parent");
            return Ok(());
        }
        if self.ctx.is_pipeline_running(pipeline) {
            debug!(pipeline = %node.name, "run ignored: already running");
            return Ok(());
        }
        self.ctx.start_pipeline(graph, pipeline, false);
        Ok(())
    }

    fn signal(&mut self, pipeline: PipelineId) -> Result<()> {
        let graph = self.loaded()?;
        let name = graph.pipeline_name(pipeline).to_string();
        if !self.ctx.signal(pipeline) {
            warn!(pipeline = %name, "signal ignored: pipeline is not running");
        }
        Ok(())
    }

    fn wait(&mut self, fw: &mut Framework) -> Result<FrameReport> {
        let graph = self.graph.as_ref().ok_or(StageflowError::GraphNotLoaded)?;
        if graph.revision() != fw.revision() {
            return Err(StageflowError::GraphOutdated);
        }

        loop {
            let mut changed = self.ctx.advance(graph)?;
            changed |= self.ctx.promote(graph);
            if let Some(task) = self.ctx.next_ready() {
                let actions = run_task(fw, graph, task)?;
                self.ctx.complete(graph, task, actions);
                continue;
            }
            if !changed {
                break;
            }
        }

        let report = self.ctx.take_report(graph);
        for stall in &report.stalled {
            match stall.reason {
                StallReason::WaitingForSignal => {
                    debug!(pipeline = %stall.name, stage = %stall.stage_name, "pipeline waits for a signal");
                }
                _ => warn!(
                    pipeline = %stall.name,
                    stage = %stall.stage_name,
                    reason = %stall.reason,
                    "pipeline stalled"
                ),
            }
        }
        if self.options.log_state {
            debug!("executor state:\n{}", self.ctx.state_table(graph));
        }
        trace!(
            executed = report.executed.len(),
            skipped = report.skipped.len(),
            "wait finished"
        );
        Ok(report)
    }

    fn is_running(&self) -> bool {
        self.ctx.is_busy()
    }
}

/// Resolve the task's arguments and invoke its body.
fn run_task(fw: &mut Framework, graph: &TaskGraph, task: TaskId) -> Result<TaskActions> {
    let node = graph.task(task).ok_or(StageflowError::UnknownTask(task))?;
    let desc = fw
        .tasks
        .get_mut(task)
        .and_then(Option::as_mut)
        .ok_or(StageflowError::UnknownTask(task))?;
    let Some(func) = desc.func.as_mut() else {
        trace!(task = %node.name, "task has no body");
        return Ok(TaskActions::default());
    };

    let args = fw.data.args(&node.args)?;
    trace!(task = %node.name, "running task");
    func(&args).map_err(|source| {
        info!(task = %node.name, "task body failed");
        StageflowError::TaskFailed {
            task,
            name: node.name.clone(),
            source,
        }
    })
}
