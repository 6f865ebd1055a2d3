// src/engine/mod.rs

//! Application shell around the scheduler.
//!
//! The pure core state machine lives in [`core`]: it owns the framework, the
//! demo scene and the executor, and turns [`RuntimeEvent`]s into executor
//! calls. The async shell in [`runtime`] feeds it from a `tokio` channel
//! (frame ticker, Ctrl-C) and acts on the [`CoreCommand`]s it returns.

use crate::exec::{ExecutorOptions, FrameReport};
use crate::framework::FrameworkLimits;
use crate::scene::SceneSettings;

/// Everything needed to build a [`CoreRuntime`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuntimeOptions {
    pub executor: ExecutorOptions,
    pub limits: FrameworkLimits,
    pub scene: SceneSettings,
}

/// Events flowing into the runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuntimeEvent {
    /// Run one frame of the main pipeline with this delta time (seconds).
    FrameRequested { dt: f32 },
    /// A render consumer appeared; register it and resync.
    ConsumerAttached,
    /// The render consumer went away; close its sessions.
    ConsumerDetached,
    /// Graceful shutdown requested (ticker finished or Ctrl-C).
    ShutdownRequested,
}

/// What the shell should do after a core step.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    FrameCompleted { frame: u64, report: FrameReport },
    RequestExit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    pub keep_running: bool,
}

impl CoreStep {
    fn idle() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: true,
        }
    }
}

pub mod core;
pub mod runtime;

pub use core::CoreRuntime;
pub use runtime::{Runtime, RunSummary, TickerPlan, spawn_frame_ticker};
