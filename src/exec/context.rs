// src/exec/context.rs

//! Mutable execution state and the rules that move it forward.
//!
//! `ExecContext` never touches task bodies or data; the executor runs the
//! task it gets from the ready queue and reports back through
//! [`ExecContext::complete`]. Every method takes the loaded [`TaskGraph`]
//! explicitly so the context can live next to it without self-borrowing.

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, trace};

use crate::errors::{Result, StageflowError};
use crate::exec::report::{FrameReport, StallReason, StalledPipeline};
use crate::framework::TaskActions;
use crate::graph::TaskGraph;
use crate::ids::{Id, KeyedVec, PipelineId, StageId, TaskId};
use crate::pipeline::{StageRole, SyncMode};

/// Per-cycle state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Its stage has not been reached this cycle.
    #[default]
    Idle,
    /// Waiting for sync targets, or in the ready queue.
    Queued,
    Done,
    Skipped,
}

impl TaskState {
    fn is_finished(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Skipped)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PipelineState {
    pub running: bool,
    pub stage: StageId,
    pub canceled: bool,
    /// The scheduler of the current stage has not finished yet.
    pub scheduler_pending: bool,
    /// Children and run_on tasks of the current stage were started.
    pub opened: bool,
    pub signaled: bool,
    /// Loop restarts since the pipeline was started; at most
    /// `max_loop_iterations` are allowed.
    pub iterations: u32,
    /// Completed cycles since load.
    pub cycles: u64,
}

enum Readiness {
    Ready,
    Blocked,
    Skip,
}

#[derive(Debug, Default)]
pub struct ExecContext {
    pub(crate) pipelines: KeyedVec<PipelineId, PipelineState>,
    pub(crate) tasks: KeyedVec<TaskId, TaskState>,
    /// Queued tasks whose sync targets are not open yet, in enqueue order.
    pub(crate) waiting: Vec<TaskId>,
    pub(crate) ready: VecDeque<TaskId>,
    report: FrameReport,
    max_loop_iterations: u32,
}

impl ExecContext {
    pub(crate) fn new(graph: &TaskGraph, max_loop_iterations: u32) -> Self {
        let mut pipelines = KeyedVec::new();
        pipelines.resize(graph.pipeline_capacity());
        let mut tasks = KeyedVec::new();
        tasks.resize(graph.task_capacity());
        Self {
            pipelines,
            tasks,
            waiting: Vec::new(),
            ready: VecDeque::new(),
            report: FrameReport::default(),
            max_loop_iterations,
        }
    }

    pub fn is_busy(&self) -> bool {
        !self.ready.is_empty()
            || !self.waiting.is_empty()
            || self.pipelines.iter().any(|(_, st)| st.running)
    }

    pub fn is_pipeline_running(&self, id: PipelineId) -> bool {
        self.pipelines.get(id).is_some_and(|st| st.running)
    }

    /// Current stage of a running pipeline.
    pub fn current_stage(&self, id: PipelineId) -> Option<StageId> {
        self.pipelines
            .get(id)
            .filter(|st| st.running)
            .map(|st| st.stage)
    }

    pub fn is_canceled(&self, id: PipelineId) -> bool {
        self.pipelines.get(id).is_some_and(|st| st.canceled)
    }

    pub fn completed_cycles(&self, id: PipelineId) -> u64 {
        self.pipelines.get(id).map(|st| st.cycles).unwrap_or(0)
    }

    pub fn task_state(&self, id: TaskId) -> TaskState {
        self.tasks.get(id).copied().unwrap_or_default()
    }

    // ---- pipeline lifecycle ----------------------------------------------

    pub(crate) fn start_pipeline(&mut self, graph: &TaskGraph, p: PipelineId, canceled: bool) {
        let Some(node) = graph.pipeline(p) else { return };
        self.reset_tasks(graph, p);
        let st = &mut self.pipelines[p];
        st.running = true;
        st.canceled = canceled;
        st.signaled = false;
        st.iterations = 0;
        debug!(pipeline = %node.name, canceled, "pipeline started");
        self.enter_stage(graph, p, 0);
    }

    /// Forget last cycle's outcome for every task of `p` and its children.
    /// A stage synced by a child task sees it as pending before the child
    /// starts.
    fn reset_tasks(&mut self, graph: &TaskGraph, p: PipelineId) {
        let Some(node) = graph.pipeline(p) else { return };
        for lists in &node.stage_tasks {
            for t in &lists.run_on {
                self.tasks[*t] = TaskState::Idle;
            }
            for child in &lists.children {
                self.reset_tasks(graph, *child);
            }
        }
    }

    fn enter_stage(&mut self, graph: &TaskGraph, p: PipelineId, stage: StageId) {
        let Some(node) = graph.pipeline(p) else { return };
        let st = &mut self.pipelines[p];
        st.stage = stage;
        st.opened = false;
        st.scheduler_pending = false;
        trace!(pipeline = %node.name, stage = node.stages.stage_name(stage), "entered stage");

        let scheduler = node
            .scheduler
            .filter(|s| graph.task(*s).is_some_and(|t| t.run_on.stage == stage));
        if let Some(sched) = scheduler
            && !st.canceled
        {
            st.scheduler_pending = true;
            self.enqueue(sched);
            return;
        }
        self.open_stage(graph, p);
    }

    /// Start children and queue the stage's tasks.
    fn open_stage(&mut self, graph: &TaskGraph, p: PipelineId) {
        let Some(node) = graph.pipeline(p) else { return };
        let st = &mut self.pipelines[p];
        st.opened = true;
        let stage = st.stage;
        let canceled = st.canceled;
        let role = node.stages.role(stage);
        let lists = &node.stage_tasks[stage as usize];

        for child in &lists.children {
            self.start_pipeline(graph, *child, canceled);
        }
        for t in &lists.run_on {
            let is_scheduler = node.scheduler == Some(*t);
            if is_scheduler && self.tasks[*t].is_finished() {
                continue;
            }
            if canceled && (is_scheduler || role != StageRole::Clear) {
                self.skip(graph, *t);
            } else {
                self.enqueue(*t);
            }
        }
    }

    fn leave_stage(&mut self, graph: &TaskGraph, p: PipelineId) -> Result<()> {
        let Some(node) = graph.pipeline(p) else {
            return Ok(());
        };
        let st = &mut self.pipelines[p];
        let stage = st.stage;
        if node.wait_stage == Some(stage) {
            st.signaled = false;
        }
        if stage < node.stages.last() {
            self.enter_stage(graph, p, stage + 1);
            return Ok(());
        }

        st.cycles += 1;
        if node.loops && !st.canceled {
            st.iterations += 1;
            if st.iterations > self.max_loop_iterations {
                return Err(StageflowError::LoopLimitExceeded {
                    pipeline: node.name.clone(),
                    limit: self.max_loop_iterations,
                });
            }
            let iteration = st.iterations;
            self.reset_tasks(graph, p);
            trace!(pipeline = %node.name, iteration, "pipeline loops");
            self.enter_stage(graph, p, 0);
        } else {
            st.running = false;
            debug!(pipeline = %node.name, canceled = st.canceled, "pipeline finished");
        }
        Ok(())
    }

    /// Leave stages until no running pipeline can move. Returns whether
    /// anything moved.
    pub(crate) fn advance(&mut self, graph: &TaskGraph) -> Result<bool> {
        let mut any = false;
        loop {
            let mut moved = false;
            for index in 0..self.pipelines.len() {
                let p = PipelineId::from_index(index);
                if self.pipelines[p].running && self.exit_blocker(graph, p).is_none() {
                    self.leave_stage(graph, p)?;
                    moved = true;
                }
            }
            if !moved {
                return Ok(any);
            }
            any = true;
        }
    }

    /// Why `p` cannot leave its current stage, if it cannot.
    fn exit_blocker(&self, graph: &TaskGraph, p: PipelineId) -> Option<StallReason> {
        let node = graph.pipeline(p)?;
        let st = &self.pipelines[p];
        let lists = &node.stage_tasks[st.stage as usize];

        if st.scheduler_pending {
            return Some(StallReason::PendingTasks(node.scheduler.into_iter().collect()));
        }
        let pending: Vec<TaskId> = lists
            .run_on
            .iter()
            .copied()
            .filter(|t| !self.tasks[*t].is_finished())
            .collect();
        if !pending.is_empty() {
            return Some(StallReason::PendingTasks(pending));
        }
        let children: Vec<PipelineId> = lists
            .children
            .iter()
            .copied()
            .filter(|c| self.pipelines[*c].running)
            .collect();
        if !children.is_empty() {
            return Some(StallReason::RunningChildren(children));
        }
        if node.wait_stage == Some(st.stage) && !st.signaled {
            return Some(StallReason::WaitingForSignal);
        }
        let syncing: Vec<TaskId> = lists
            .syncing
            .iter()
            .copied()
            .filter(|t| match self.tasks[*t] {
                TaskState::Queued => true,
                TaskState::Idle => self.expected(graph, *t),
                TaskState::Done | TaskState::Skipped => false,
            })
            .collect();
        if !syncing.is_empty() {
            return Some(StallReason::SyncingTasks(syncing));
        }
        None
    }

    /// Will `t` still be queued during the current cycle of its pipeline?
    fn expected(&self, graph: &TaskGraph, t: TaskId) -> bool {
        let Some(task) = graph.task(t) else {
            return false;
        };
        let r = task.run_on.pipeline;
        let st = &self.pipelines[r];
        if st.running {
            st.stage < task.run_on.stage || (st.stage == task.run_on.stage && !st.opened)
        } else {
            self.will_start(graph, r)
        }
    }

    fn will_start(&self, graph: &TaskGraph, p: PipelineId) -> bool {
        let Some(parent) = graph.parent_of(p) else {
            return false;
        };
        let st = &self.pipelines[parent.pipeline];
        if st.running {
            st.stage < parent.stage || (st.stage == parent.stage && !st.opened)
        } else {
            self.will_start(graph, parent.pipeline)
        }
    }

    // ---- tasks -------------------------------------------------------------

    fn enqueue(&mut self, t: TaskId) {
        self.tasks[t] = TaskState::Queued;
        self.waiting.push(t);
    }

    fn skip(&mut self, graph: &TaskGraph, t: TaskId) {
        self.tasks[t] = TaskState::Skipped;
        self.report.skipped.push(t);
        trace!(task = graph.task_name(t), "task skipped");

        // A scheduler that never ran cannot let its stage proceed.
        if let Some(task) = graph.task(t)
            && task.schedules
        {
            let p = task.run_on.pipeline;
            let st = &mut self.pipelines[p];
            if st.scheduler_pending {
                st.scheduler_pending = false;
                st.canceled = true;
                self.open_stage(graph, p);
            }
        }
    }

    fn readiness(&self, graph: &TaskGraph, t: TaskId) -> Readiness {
        let Some(task) = graph.task(t) else {
            return Readiness::Skip;
        };
        for sw in &task.sync_with {
            if sw.target == task.run_on {
                continue;
            }
            let target = &self.pipelines[sw.target.pipeline];
            if !target.running {
                // A child that starts later this frame still runs this frame.
                match sw.mode {
                    SyncMode::UseOrRun if !self.will_start(graph, sw.target.pipeline) => continue,
                    _ => return Readiness::Blocked,
                }
            }
            let role = graph
                .pipeline(sw.target.pipeline)
                .map(|n| n.stages.role(sw.target.stage))
                .unwrap_or_default();
            if target.canceled && target.stage <= sw.target.stage && role != StageRole::Clear {
                return Readiness::Skip;
            }
            if target.stage != sw.target.stage || target.scheduler_pending {
                return Readiness::Blocked;
            }
        }
        Readiness::Ready
    }

    /// Move queued tasks whose sync targets opened to the ready queue.
    pub(crate) fn promote(&mut self, graph: &TaskGraph) -> bool {
        let mut changed = false;
        let mut still = Vec::new();
        for t in std::mem::take(&mut self.waiting) {
            match self.readiness(graph, t) {
                Readiness::Ready => {
                    self.ready.push_back(t);
                    changed = true;
                }
                Readiness::Skip => {
                    self.skip(graph, t);
                    changed = true;
                }
                Readiness::Blocked => still.push(t),
            }
        }
        still.append(&mut self.waiting);
        self.waiting = still;
        changed
    }

    pub(crate) fn next_ready(&mut self) -> Option<TaskId> {
        self.ready.pop_front()
    }

    /// Record a finished invocation and apply what the task asked for.
    pub(crate) fn complete(&mut self, graph: &TaskGraph, t: TaskId, actions: TaskActions) {
        self.tasks[t] = TaskState::Done;
        self.report.executed.push(t);

        let Some(task) = graph.task(t) else { return };
        if !task.schedules {
            if actions.cancel {
                debug!(task = %task.name, "cancel ignored from a non-scheduling task");
            }
            return;
        }
        let p = task.run_on.pipeline;
        let st = &mut self.pipelines[p];
        if actions.cancel {
            st.canceled = true;
            debug!(pipeline = graph.pipeline_name(p), task = %task.name, "pipeline canceled for this cycle");
        }
        if st.scheduler_pending {
            st.scheduler_pending = false;
            self.open_stage(graph, p);
        }
    }

    // ---- frame bookkeeping ---------------------------------------------------

    pub(crate) fn signal(&mut self, p: PipelineId) -> bool {
        match self.pipelines.get_mut(p) {
            Some(st) if st.running => {
                st.signaled = true;
                true
            }
            _ => false,
        }
    }

    /// Hand out the report of everything since the last call.
    pub(crate) fn take_report(&mut self, graph: &TaskGraph) -> FrameReport {
        let mut report = std::mem::take(&mut self.report);
        for (p, st) in self.pipelines.iter() {
            if !st.running {
                continue;
            }
            let Some(reason) = self.exit_blocker(graph, p) else {
                continue;
            };
            let (name, stage_name) = graph
                .pipeline(p)
                .map(|n| (n.name.clone(), n.stages.stage_name(st.stage).to_string()))
                .unwrap_or_default();
            report.stalled.push(StalledPipeline {
                pipeline: p,
                name,
                stage: st.stage,
                stage_name,
                reason,
            });
        }
        report
    }

    pub fn state_table<'a>(&'a self, graph: &'a TaskGraph) -> StateTable<'a> {
        StateTable { graph, ctx: self }
    }
}

/// Human readable dump of every pipeline's state.
///
/// Flags: `R` running, `L` looping, `C` canceled, `S` blocked on a signal,
/// `Q` tasks in the ready queue, `B` tasks waiting on sync targets.
pub struct StateTable<'a> {
    graph: &'a TaskGraph,
    ctx: &'a ExecContext,
}

impl StateTable<'_> {
    fn row(&self, f: &mut fmt::Formatter<'_>, p: PipelineId, depth: usize) -> fmt::Result {
        let Some(node) = self.graph.pipeline(p) else {
            return Ok(());
        };
        let st = &self.ctx.pipelines[p];
        let current = &node.stage_tasks[st.stage as usize].run_on;
        let flag = |on: bool, c: char| if on { c } else { '-' };
        let flags: String = [
            flag(st.running, 'R'),
            flag(node.loops, 'L'),
            flag(st.canceled, 'C'),
            flag(
                st.running && node.wait_stage == Some(st.stage) && !st.signaled,
                'S',
            ),
            flag(st.running && current.iter().any(|t| self.ctx.ready.contains(t)), 'Q'),
            flag(st.running && current.iter().any(|t| self.ctx.waiting.contains(t)), 'B'),
        ]
        .into_iter()
        .collect();

        let stages: Vec<String> = node
            .stages
            .stage_names()
            .enumerate()
            .map(|(i, name)| {
                if st.running && i == st.stage as usize {
                    format!("[{name}]")
                } else {
                    name.to_string()
                }
            })
            .collect();

        let label = format!("{:indent$}{}", "", node.name, indent = depth * 2);
        writeln!(f, "{label:<28} {flags} {}", stages.join(" "))?;

        for lists in &node.stage_tasks {
            for child in &lists.children {
                self.row(f, *child, depth + 1)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for StateTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<28} {:<6} stages", "pipeline", "flags")?;
        for p in self.graph.top_level() {
            self.row(f, *p, 0)?;
        }
        Ok(())
    }
}
