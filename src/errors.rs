// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Configuration errors are produced once, when sessions commit tasks or when
//! the task graph is finalized. Runtime errors out of [`crate::exec`] are
//! either fatal task-body failures or misuse of the executor.

use thiserror::Error;

use crate::ids::{ContextId, DataId, PipelineId, TaskId};

#[derive(Error, Debug)]
pub enum StageflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{kind} id capacity exceeded (limit {limit})")]
    IdCapacityExceeded { kind: &'static str, limit: usize },

    #[error("unknown data id {id:?}: {context}")]
    UnknownData { id: DataId, context: String },

    #[error("unknown pipeline id {id:?}: {context}")]
    UnknownPipeline { id: PipelineId, context: String },

    #[error("unknown task id {0:?}")]
    UnknownTask(TaskId),

    #[error("invalid stage {stage} for pipeline '{pipeline}' ({stage_count} stages)")]
    InvalidStage {
        pipeline: String,
        stage: usize,
        stage_count: usize,
    },

    #[error("duplicate stage '{stage}' in stage set '{set}'")]
    DuplicateStage { set: String, stage: String },

    #[error("task '{0}' has no run_on stage")]
    MissingRunOn(String),

    #[error("pipeline '{pipeline}' is scheduled by both '{first}' and '{second}'")]
    DuplicateScheduler {
        pipeline: String,
        first: String,
        second: String,
    },

    #[error("task '{task}': {reason}")]
    InvalidTask { task: String, reason: String },

    #[error("pipeline '{pipeline}': {reason}")]
    InvalidPipeline { pipeline: String, reason: String },

    #[error("pipeline parent chain forms a cycle at '{0}'")]
    ParentCycle(String),

    #[error("deadlock: stage ordering cycle involving {0}")]
    DeadlockCycle(String),

    #[error("tasks '{first}' and '{second}' may run unordered but share {data:?} with write access")]
    AccessConflict {
        first: String,
        second: String,
        data: DataId,
    },

    #[error("unknown context {0:?}")]
    UnknownContext(ContextId),

    #[error("context {context:?} has no '{interface}' interface")]
    MissingInterface {
        interface: &'static str,
        context: ContextId,
    },

    #[error("context {context:?} already has a '{interface}' interface")]
    DuplicateInterface {
        interface: &'static str,
        context: ContextId,
    },

    #[error("executor has no task graph loaded")]
    GraphNotLoaded,

    #[error("framework changed since the task graph was loaded; call load() again")]
    GraphOutdated,

    #[error("pipeline '{pipeline}' looped {limit} times without its scheduler canceling")]
    LoopLimitExceeded { pipeline: String, limit: u32 },

    #[error("task '{name}' ({task:?}) failed: {source}")]
    TaskFailed {
        task: TaskId,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("data {id:?} holds {found}, requested {expected}")]
    DataTypeMismatch {
        id: DataId,
        expected: &'static str,
        found: &'static str,
    },

    #[error("data {0:?} is empty")]
    DataEmpty(DataId),

    #[error("argument {index} ({id:?}) was declared read-only")]
    AccessViolation { index: usize, id: DataId },

    #[error("data {0:?} is already borrowed")]
    BorrowConflict(DataId),

    #[error("argument index {index} out of range ({count} declared)")]
    ArgOutOfRange { index: usize, count: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, StageflowError>;
