// src/framework/session.rs

//! Sessions: the unit scenes are composed from.
//!
//! A setup function opens a [`SessionBuilder`], registers its data, pipelines
//! and tasks through it, and returns the finished [`Session`] together with
//! plain structs naming the ids other setup functions need. Sessions may also
//! publish those structs as feature interfaces into a context, where later
//! setup functions find them.

use std::any::Any;
use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::framework::Framework;
use crate::framework::feature::{FeatureInterface, InterfaceKey};
use crate::framework::task::TaskDesc;
use crate::ids::{ContextId, DataId, PipelineId, StageId, TaskId};
use crate::pipeline::{Pipeline, PipelineInfo, PipelineStage, StageSet, StageSetInfo};

/// Ids registered by one setup function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub name: String,
    pub data: Vec<DataId>,
    pub pipelines: Vec<PipelineId>,
    pub tasks: Vec<TaskId>,
    /// Interfaces this session published; withdrawn when it closes.
    pub implements: Vec<InterfaceKey>,
    pub depends_on: Vec<InterfaceKey>,
}

impl Session {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Registration front-end that records everything it creates in a session.
#[derive(Debug)]
pub struct SessionBuilder<'a> {
    fw: &'a mut Framework,
    session: Session,
}

impl<'a> SessionBuilder<'a> {
    pub fn new(fw: &'a mut Framework, name: impl Into<String>) -> Self {
        Self {
            fw,
            session: Session::new(name),
        }
    }

    pub fn data_create(&mut self) -> Result<DataId> {
        let id = self.fw.data_create()?;
        self.session.data.push(id);
        Ok(id)
    }

    pub fn data_emplace<T: Any + Send>(&mut self, value: T) -> Result<DataId> {
        let id = self.fw.data_emplace(value)?;
        self.session.data.push(id);
        Ok(id)
    }

    pub fn create_pipeline<S: StageSet>(&mut self, name: impl Into<String>) -> Result<Pipeline<S>> {
        let pl = self.fw.create_pipeline::<S>(name)?;
        self.session.pipelines.push(pl.id());
        Ok(pl)
    }

    pub fn create_pipeline_dyn(
        &mut self,
        name: impl Into<String>,
        stages: Arc<StageSetInfo>,
    ) -> Result<PipelineId> {
        let id = self.fw.create_pipeline_dyn(name, stages)?;
        self.session.pipelines.push(id);
        Ok(id)
    }

    /// Control record of a pipeline (not necessarily one of this session's).
    pub fn pipeline(&mut self, id: impl Into<PipelineId>) -> Result<PipelineRef<'_>> {
        self.fw.pipeline(id)
    }

    /// Commit a task and record it in this session.
    pub fn task(&mut self, desc: TaskDesc) -> Result<TaskId> {
        let task = self.fw.add_task(desc)?;
        Ok(task.push_to(&mut self.session.tasks))
    }

    /// Publish `value` as this session's implementation of `I` in `context`.
    pub fn implements<I: FeatureInterface>(&mut self, context: ContextId, value: I) -> Result<()> {
        let key = self.fw.contexts.publish(context, value)?;
        self.session.implements.push(key);
        Ok(())
    }

    /// Look up `I` in `context` and record the dependency.
    pub fn depends_on<I: FeatureInterface>(&mut self, context: ContextId) -> Result<I> {
        let value = self.fw.interface::<I>(context)?;
        self.session.depends_on.push(InterfaceKey::of::<I>(context));
        Ok(value)
    }

    pub fn framework(&mut self) -> &mut Framework {
        self.fw
    }

    pub fn finish(self) -> Session {
        debug!(
            session = %self.session.name,
            data = self.session.data.len(),
            pipelines = self.session.pipelines.len(),
            tasks = self.session.tasks.len(),
            interfaces = self.session.implements.len(),
            "session registered"
        );
        self.session
    }
}

/// Mutable view of one pipeline's control record.
#[derive(Debug)]
pub struct PipelineRef<'a> {
    pub(crate) info: &'a mut PipelineInfo,
    pub(crate) revision: &'a mut u64,
}

impl PipelineRef<'_> {
    /// Run only inside `parent`'s stage window.
    pub fn parent(self, parent: PipelineStage) -> Self {
        self.info.parent = Some(parent);
        *self.revision += 1;
        self
    }

    /// Restart from the first stage after the last one until the scheduler
    /// cancels.
    pub fn loops(self, loops: bool) -> Self {
        self.info.loops = loops;
        *self.revision += 1;
        self
    }

    /// Hold the pipeline at `stage` until the executor receives a signal.
    pub fn wait_for_signal(self, stage: StageId) -> Self {
        self.info.wait_stage = Some(stage);
        *self.revision += 1;
        self
    }

    pub fn info(&self) -> &PipelineInfo {
        self.info
    }
}
