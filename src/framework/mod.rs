// src/framework/mod.rs

//! The framework owns everything sessions register.
//!
//! - [`data`]: the type-erased arena and the argument view tasks receive.
//! - [`task`]: immutable task descriptors and their results.
//! - [`session`]: session bookkeeping and the registration front-end.
//! - [`feature`]: interfaces sessions publish into a context for others to
//!   look up.
//!
//! Every structural change bumps [`Framework::revision`] so a loaded executor
//! can tell its task graph went stale.

pub mod data;
pub mod feature;
pub mod session;
pub mod task;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{Result, StageflowError};
use crate::ids::{ContextId, DataId, IdRegistry, KeyedVec, PipelineId, TaskId};
use crate::pipeline::{Pipeline, PipelineInfo, StageSet, StageSetInfo};

pub use data::{Access, Arg, DataArena, TaskArgs};
pub use feature::{FeatureInterface, InterfaceKey};
pub use session::{PipelineRef, Session, SessionBuilder};
pub use task::{IntoTaskResult, TaskActions, TaskDesc, TaskRef};

/// Hard limits on the id registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameworkLimits {
    pub max_data: usize,
    pub max_pipelines: usize,
    pub max_tasks: usize,
}

impl Default for FrameworkLimits {
    fn default() -> Self {
        Self {
            max_data: 65536,
            max_pipelines: 4096,
            max_tasks: 65536,
        }
    }
}

pub struct Framework {
    pub(crate) data: DataArena,
    pub(crate) pipeline_ids: IdRegistry<PipelineId>,
    pub(crate) pipelines: KeyedVec<PipelineId, Option<PipelineInfo>>,
    pub(crate) task_ids: IdRegistry<TaskId>,
    pub(crate) tasks: KeyedVec<TaskId, Option<TaskDesc>>,
    pub(crate) contexts: feature::Contexts,
    pub(crate) revision: u64,
}

impl fmt::Debug for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framework")
            .field("data", &self.data)
            .field("pipelines", &self.pipeline_ids.len())
            .field("tasks", &self.task_ids.len())
            .field("contexts", &self.contexts)
            .field("revision", &self.revision)
            .finish()
    }
}

impl Default for Framework {
    fn default() -> Self {
        Self::with_limits(FrameworkLimits::default())
    }
}

impl Framework {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: FrameworkLimits) -> Self {
        Self {
            data: DataArena::with_limit(limits.max_data),
            pipeline_ids: IdRegistry::with_limit(limits.max_pipelines),
            pipelines: KeyedVec::new(),
            task_ids: IdRegistry::with_limit(limits.max_tasks),
            tasks: KeyedVec::new(),
            contexts: feature::Contexts::default(),
            revision: 0,
        }
    }

    /// Open a session that records what it registers.
    pub fn session(&mut self, name: impl Into<String>) -> SessionBuilder<'_> {
        SessionBuilder::new(self, name)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ---- data -------------------------------------------------------------

    pub fn data_create(&mut self) -> Result<DataId> {
        self.data.create()
    }

    pub fn data_emplace<T: Any + Send>(&mut self, value: T) -> Result<DataId> {
        let id = self.data.create()?;
        self.data.insert(id, value)?;
        Ok(id)
    }

    /// Fill (or replace) the value of an existing slot.
    pub fn data_insert<T: Any + Send>(&mut self, id: DataId, value: T) -> Result<()> {
        self.data.insert(id, value)
    }

    pub fn data_get<T: 'static>(&self, id: DataId) -> Result<&T> {
        self.data.get(id)
    }

    pub fn data_get_mut<T: 'static>(&mut self, id: DataId) -> Result<&mut T> {
        self.data.get_mut(id)
    }

    pub fn data_remove(&mut self, id: DataId) -> bool {
        self.data.remove(id)
    }

    pub fn data(&self) -> &DataArena {
        &self.data
    }

    // ---- pipelines --------------------------------------------------------

    pub fn create_pipeline<S: StageSet>(&mut self, name: impl Into<String>) -> Result<Pipeline<S>> {
        let id = self.create_pipeline_dyn(name, S::info()?)?;
        Ok(Pipeline::from_id(id))
    }

    pub fn create_pipeline_dyn(
        &mut self,
        name: impl Into<String>,
        stages: Arc<StageSetInfo>,
    ) -> Result<PipelineId> {
        let id = self.pipeline_ids.create()?;
        self.pipelines.ensure(id);
        self.pipelines[id] = Some(PipelineInfo::new(name, stages));
        self.revision += 1;
        Ok(id)
    }

    pub fn pipeline(&mut self, id: impl Into<PipelineId>) -> Result<PipelineRef<'_>> {
        let id = id.into();
        let info = self
            .pipelines
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or_else(|| StageflowError::UnknownPipeline {
                id,
                context: "pipeline control".to_string(),
            })?;
        Ok(PipelineRef {
            info,
            revision: &mut self.revision,
        })
    }

    pub fn pipeline_info(&self, id: PipelineId) -> Option<&PipelineInfo> {
        self.pipelines.get(id).and_then(Option::as_ref)
    }

    pub fn pipeline_ids(&self) -> impl Iterator<Item = PipelineId> + '_ {
        self.pipeline_ids.iter()
    }

    /// Capacity of pipeline-indexed tables.
    pub fn pipeline_capacity(&self) -> usize {
        self.pipeline_ids.capacity()
    }

    pub fn remove_pipeline(&mut self, id: PipelineId) -> bool {
        if !self.pipeline_ids.remove(id) {
            return false;
        }
        self.pipelines[id] = None;
        self.revision += 1;
        true
    }

    // ---- tasks ------------------------------------------------------------

    /// Commit a task.
    ///
    /// Every data and pipeline id the task names must already exist. The
    /// remaining structural checks happen when the task graph is built.
    pub fn add_task(&mut self, desc: TaskDesc) -> Result<TaskRef> {
        for arg in &desc.args {
            if !self.data.contains(arg.id) {
                return Err(StageflowError::UnknownData {
                    id: arg.id,
                    context: format!("args of task '{}'", desc.name),
                });
            }
        }
        let stages = desc
            .run_on
            .iter()
            .map(|ps| ("run_on", ps))
            .chain(desc.sync_with.iter().map(|sw| ("sync_with", &sw.target)));
        for (what, ps) in stages {
            if !self.pipeline_ids.contains(ps.pipeline) {
                return Err(StageflowError::UnknownPipeline {
                    id: ps.pipeline,
                    context: format!("{what} of task '{}'", desc.name),
                });
            }
        }

        let id = self.task_ids.create()?;
        self.tasks.ensure(id);
        self.tasks[id] = Some(desc);
        self.revision += 1;
        Ok(TaskRef { id })
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskDesc> {
        self.tasks.get(id).and_then(Option::as_ref)
    }

    pub fn task_name(&self, id: TaskId) -> &str {
        self.task(id).map(TaskDesc::label).unwrap_or("?")
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.task_ids.iter()
    }

    pub fn task_capacity(&self) -> usize {
        self.task_ids.capacity()
    }

    pub fn remove_task(&mut self, id: TaskId) -> bool {
        if !self.task_ids.remove(id) {
            return false;
        }
        self.tasks[id] = None;
        self.revision += 1;
        true
    }

    // ---- feature contexts ---------------------------------------------------

    pub fn context_create(&mut self) -> Result<ContextId> {
        self.contexts.create()
    }

    /// Drop a context and every interface still published in it.
    pub fn context_remove(&mut self, id: ContextId) -> bool {
        self.contexts.remove(id)
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Interface `I` as published in `context`.
    pub fn interface<I: FeatureInterface>(&self, context: ContextId) -> Result<I> {
        self.contexts.get(context)
    }

    // ---- sessions -----------------------------------------------------------

    /// Tear down everything a session registered.
    pub fn close_session(&mut self, session: Session) {
        for key in &session.implements {
            self.contexts.withdraw(*key);
        }
        for task in &session.tasks {
            self.remove_task(*task);
        }
        for pipeline in &session.pipelines {
            self.remove_pipeline(*pipeline);
        }
        for data in &session.data {
            self.data.remove(*data);
        }
        self.revision += 1;
        info!(
            session = %session.name,
            tasks = session.tasks.len(),
            pipelines = session.pipelines.len(),
            data = session.data.len(),
            "session closed"
        );
    }

    /// Close sessions in reverse registration order.
    pub fn close_sessions(&mut self, sessions: Vec<Session>) {
        for session in sessions.into_iter().rev() {
            self.close_session(session);
        }
        debug!(revision = self.revision, "sessions closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Container, Event, PipelineStage};

    #[test]
    fn add_task_rejects_unknown_ids() {
        let mut fw = Framework::new();
        let pl = fw.create_pipeline::<Event>("main").unwrap();

        let err = fw
            .add_task(TaskDesc::new().name("t").run_on(pl.at(Event::Run)).args([DataId(7)]))
            .unwrap_err();
        assert!(matches!(err, StageflowError::UnknownData { id: DataId(7), .. }));

        let missing = PipelineStage::new(PipelineId(9), 0);
        let err = fw
            .add_task(TaskDesc::new().name("t").run_on(pl.at(Event::Run)).sync_with([missing]))
            .unwrap_err();
        assert!(matches!(err, StageflowError::UnknownPipeline { id: PipelineId(9), .. }));
        assert_eq!(fw.task_ids().count(), 0);
    }

    #[test]
    fn session_builder_records_ids() {
        let mut fw = Framework::new();
        let mut sb = fw.session("entities");
        let count = sb.data_emplace(0usize).unwrap();
        let pl = sb.create_pipeline::<Container>("entities").unwrap();
        let task = sb
            .task(TaskDesc::new().name("count").run_on(pl.at(Container::New)).args([count]))
            .unwrap();
        let session = sb.finish();

        assert_eq!(session.name, "entities");
        assert_eq!(session.data, vec![count]);
        assert_eq!(session.pipelines, vec![pl.id()]);
        assert_eq!(session.tasks, vec![task]);
        assert_eq!(fw.task_name(task), "count");
    }

    #[test]
    fn closing_sessions_frees_ids_and_bumps_revision() {
        let mut fw = Framework::new();
        let mut first = fw.session("first");
        let a = first.data_emplace(1u32).unwrap();
        let first = first.finish();
        let mut second = fw.session("second");
        let b = second.data_emplace(2u32).unwrap();
        let second = second.finish();

        let before = fw.revision();
        fw.close_sessions(vec![first, second]);
        assert!(fw.revision() > before);
        assert!(!fw.data().contains(a));
        assert!(!fw.data().contains(b));
        assert!(fw.data().is_empty());
    }

    #[test]
    fn pipeline_control_is_recorded() {
        let mut fw = Framework::new();
        let outer = fw.create_pipeline::<Event>("outer").unwrap();
        let inner = fw.create_pipeline::<Container>("inner").unwrap();
        fw.pipeline(inner)
            .unwrap()
            .parent(outer.at(Event::Run))
            .loops(true)
            .wait_for_signal(Container::Ready.id());

        let info = fw.pipeline_info(inner.id()).unwrap();
        assert_eq!(info.parent, Some(outer.at(Event::Run)));
        assert!(info.loops);
        assert_eq!(info.wait_stage, Some(Container::Ready.id()));
    }
}
