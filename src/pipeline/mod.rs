// src/pipeline/mod.rs

//! Pipelines and the stage targets tasks attach to.
//!
//! - [`stages`] defines stage sets and stage roles.
//! - [`PipelineStage`] names one stage of one pipeline (a trigger or a
//!   synchronization point).
//! - [`SyncWith`] is a task's ordering constraint against a pipeline stage,
//!   carrying an explicit [`SyncMode`].

pub mod stages;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::ids::{PipelineId, StageId};

pub use stages::{Container, Event, Intermediate, Queue, StageRole, StageSet, StageSetInfo};

/// Typed pipeline handle. Converts freely into a [`PipelineId`].
pub struct Pipeline<S: StageSet> {
    id: PipelineId,
    _stages: PhantomData<fn() -> S>,
}

impl<S: StageSet> Pipeline<S> {
    pub fn from_id(id: PipelineId) -> Self {
        Self {
            id,
            _stages: PhantomData,
        }
    }

    pub fn id(self) -> PipelineId {
        self.id
    }

    /// This pipeline at `stage`.
    pub fn at(self, stage: S) -> PipelineStage {
        PipelineStage::new(self.id, stage.id())
    }

    /// Sync target at `stage` using the mode implied by the stage role.
    pub fn sync(self, stage: S) -> SyncWith {
        SyncWith {
            target: self.at(stage),
            mode: SyncMode::from_role(stage.role()),
        }
    }

    /// Sync target at `stage` that is satisfied right away when this pipeline
    /// is not running.
    pub fn use_or_run(self, stage: S) -> SyncWith {
        SyncWith {
            target: self.at(stage),
            mode: SyncMode::UseOrRun,
        }
    }
}

impl<S: StageSet> Clone for Pipeline<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: StageSet> Copy for Pipeline<S> {}

impl<S: StageSet> PartialEq for Pipeline<S> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<S: StageSet> Eq for Pipeline<S> {}

impl<S: StageSet> fmt::Debug for Pipeline<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}<{}>", self.id, S::NAME)
    }
}

impl<S: StageSet> From<Pipeline<S>> for PipelineId {
    fn from(pl: Pipeline<S>) -> Self {
        pl.id
    }
}

/// One stage of one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PipelineStage {
    pub pipeline: PipelineId,
    pub stage: StageId,
}

impl PipelineStage {
    pub fn new(pipeline: PipelineId, stage: StageId) -> Self {
        Self { pipeline, stage }
    }
}

/// How a task waits on a foreign pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Wait until the pipeline reaches the stage; hold the stage open until
    /// the task completes.
    #[default]
    Gate,
    /// Like `Gate` while the pipeline runs this frame, otherwise use whatever
    /// the pipeline produced last time.
    UseOrRun,
}

impl SyncMode {
    pub fn from_role(role: StageRole) -> Self {
        match role {
            StageRole::UseOrRun => SyncMode::UseOrRun,
            StageRole::Gate | StageRole::Clear => SyncMode::Gate,
        }
    }
}

/// A task's ordering constraint against a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWith {
    pub target: PipelineStage,
    pub mode: SyncMode,
}

impl From<PipelineStage> for SyncWith {
    fn from(target: PipelineStage) -> Self {
        Self {
            target,
            mode: SyncMode::Gate,
        }
    }
}

/// Registration record of one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineInfo {
    pub name: String,
    pub stages: Arc<StageSetInfo>,
    /// Stage of another pipeline this one runs inside of.
    pub parent: Option<PipelineStage>,
    /// Restart at the first stage after the last one, until the scheduler
    /// cancels.
    pub loops: bool,
    /// Stage the pipeline may only leave after an external `signal`.
    pub wait_stage: Option<StageId>,
}

impl PipelineInfo {
    pub fn new(name: impl Into<String>, stages: Arc<StageSetInfo>) -> Self {
        Self {
            name: name.into(),
            stages,
            parent: None,
            loops: false,
            wait_stage: None,
        }
    }

    pub fn stage_name(&self, stage: StageId) -> &str {
        self.stages.stage_name(stage)
    }
}
