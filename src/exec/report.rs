// src/exec/report.rs

//! What one `wait` did, and why pipelines were left behind.

use std::fmt;

use crate::ids::{PipelineId, StageId, TaskId};

/// Outcome of one `wait` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Invoked tasks, in invocation order. Tasks without a body count too.
    pub executed: Vec<TaskId>,
    /// Tasks completed without invocation because of a cancel.
    pub skipped: Vec<TaskId>,
    /// Pipelines that could not finish; they stay where they are.
    pub stalled: Vec<StalledPipeline>,
}

impl FrameReport {
    /// No pipeline was left running.
    pub fn is_complete(&self) -> bool {
        self.stalled.is_empty()
    }

    pub fn times_executed(&self, task: TaskId) -> usize {
        self.executed.iter().filter(|t| **t == task).count()
    }

    pub fn was_skipped(&self, task: TaskId) -> bool {
        self.skipped.contains(&task)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledPipeline {
    pub pipeline: PipelineId,
    pub name: String,
    pub stage: StageId,
    pub stage_name: String,
    pub reason: StallReason,
}

/// The first condition that kept a pipeline in its stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StallReason {
    /// Own tasks of the stage that never became ready.
    PendingTasks(Vec<TaskId>),
    /// Child pipelines that did not finish.
    RunningChildren(Vec<PipelineId>),
    WaitingForSignal,
    /// Tasks of other pipelines that still need this stage.
    SyncingTasks(Vec<TaskId>),
}

impl fmt::Display for StallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StallReason::PendingTasks(tasks) => write!(f, "pending tasks {tasks:?}"),
            StallReason::RunningChildren(children) => write!(f, "running children {children:?}"),
            StallReason::WaitingForSignal => f.write_str("waiting for signal"),
            StallReason::SyncingTasks(tasks) => write!(f, "held open by {tasks:?}"),
        }
    }
}

impl fmt::Display for StalledPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.name, self.stage_name, self.reason)
    }
}
