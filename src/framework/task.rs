// src/framework/task.rs

//! Immutable task descriptors.
//!
//! A [`TaskDesc`] is built by chaining calls that each consume and return the
//! descriptor. Nothing reaches the framework until the finished value is
//! committed with [`crate::framework::Framework::add_task`] or
//! [`crate::framework::SessionBuilder::task`].

use std::fmt;

use crate::framework::data::{Arg, TaskArgs};
use crate::ids::TaskId;
use crate::pipeline::{PipelineStage, SyncWith};

/// What a task asks the executor to do after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskActions {
    /// Only meaningful for scheduling tasks: skip the rest of this pipeline
    /// cycle.
    pub cancel: bool,
}

impl TaskActions {
    pub fn cancel() -> Self {
        Self { cancel: true }
    }

    /// Cancel when `cond` holds, proceed otherwise.
    pub fn cancel_if(cond: bool) -> Self {
        Self { cancel: cond }
    }
}

/// Return types accepted from task bodies.
pub trait IntoTaskResult {
    fn into_task_result(self) -> anyhow::Result<TaskActions>;
}

impl IntoTaskResult for () {
    fn into_task_result(self) -> anyhow::Result<TaskActions> {
        Ok(TaskActions::default())
    }
}

impl IntoTaskResult for TaskActions {
    fn into_task_result(self) -> anyhow::Result<TaskActions> {
        Ok(self)
    }
}

impl IntoTaskResult for anyhow::Result<()> {
    fn into_task_result(self) -> anyhow::Result<TaskActions> {
        self.map(|()| TaskActions::default())
    }
}

impl IntoTaskResult for anyhow::Result<TaskActions> {
    fn into_task_result(self) -> anyhow::Result<TaskActions> {
        self
    }
}

pub(crate) type TaskFn = Box<dyn FnMut(&TaskArgs<'_>) -> anyhow::Result<TaskActions> + Send>;

/// Declarative description of one task.
///
/// ```ignore
/// let desc = TaskDesc::new()
///     .name("Spawn requested entities")
///     .run_on(entities.at(Container::New))
///     .sync_with([spawn_queue.sync(Queue::Read)])
///     .args([Arg::read(spawn_requests), Arg::write(positions)])
///     .func(|args| -> anyhow::Result<()> {
///         let requests = args.read::<Vec<Spawn>>(0)?;
///         args.write::<Vec<Vec2>>(1)?.extend(requests.iter().map(|s| s.at));
///         Ok(())
///     });
/// ```
#[derive(Default)]
pub struct TaskDesc {
    pub(crate) name: String,
    pub(crate) run_on: Vec<PipelineStage>,
    pub(crate) sync_with: Vec<SyncWith>,
    pub(crate) schedules: bool,
    pub(crate) args: Vec<Arg>,
    pub(crate) func: Option<TaskFn>,
}

impl fmt::Debug for TaskDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDesc")
            .field("name", &self.name)
            .field("run_on", &self.run_on)
            .field("sync_with", &self.sync_with)
            .field("schedules", &self.schedules)
            .field("args", &self.args)
            .field("func", &self.func.as_ref().map(|_| ".."))
            .finish()
    }
}

impl TaskDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn run_on(mut self, target: PipelineStage) -> Self {
        self.run_on.push(target);
        self
    }

    pub fn sync_with<I, W>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = W>,
        W: Into<SyncWith>,
    {
        self.sync_with.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Mark this task as the scheduler of `target`. Implies `run_on(target)`.
    pub fn schedules(mut self, target: PipelineStage) -> Self {
        self.schedules = true;
        self.run_on.push(target);
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn func<F, R>(mut self, mut f: F) -> Self
    where
        F: FnMut(&TaskArgs<'_>) -> R + Send + 'static,
        R: IntoTaskResult,
    {
        self.func = Some(Box::new(move |args| f(args).into_task_result()));
        self
    }

    pub fn label(&self) -> &str {
        &self.name
    }

    /// The single trigger, if exactly one was declared.
    pub fn trigger(&self) -> Option<PipelineStage> {
        match self.run_on.as_slice() {
            [one] => Some(*one),
            _ => None,
        }
    }

    pub fn sync_targets(&self) -> &[SyncWith] {
        &self.sync_with
    }

    pub fn declared_args(&self) -> &[Arg] {
        &self.args
    }

    pub fn is_scheduler(&self) -> bool {
        self.schedules
    }

    pub fn has_body(&self) -> bool {
        self.func.is_some()
    }
}

/// Handle returned when a task is committed without a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRef {
    pub id: TaskId,
}

impl TaskRef {
    /// Record the task in an owner list (session bookkeeping).
    pub fn push_to(self, list: &mut Vec<TaskId>) -> TaskId {
        list.push(self.id);
        self.id
    }
}
