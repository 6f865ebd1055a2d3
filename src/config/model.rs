// src/config/model.rs

use serde::Deserialize;

use crate::exec::ExecutorOptions;
use crate::framework::FrameworkLimits;
use crate::graph::GraphOptions;
use crate::scene::SceneSettings;
use crate::types::ConflictPolicy;

/// Configuration exactly as read from a TOML file.
///
/// ```toml
/// [executor]
/// conflict_policy = "deny"
/// max_loop_iterations = 1024
/// log_state = false
///
/// [limits]
/// max_data = 65536
/// max_pipelines = 4096
/// max_tasks = 65536
///
/// [app]
/// frames = 120
/// frame_rate = 60.0
/// spawn_per_frame = 2
/// attach_at = 10
/// ```
///
/// Every section and key is optional. Convert into [`ConfigFile`] with
/// `TryFrom` to get the validated form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub app: AppSection,
}

/// Validated configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub executor: ExecutorSection,
    pub limits: LimitsSection,
    pub app: AppSection,
}

impl ConfigFile {
    /// Assemble without validation; `TryFrom<RawConfigFile>` is the checked path.
    pub(crate) fn new_unchecked(
        executor: ExecutorSection,
        limits: LimitsSection,
        app: AppSection,
    ) -> Self {
        Self {
            executor,
            limits,
            app,
        }
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            graph: GraphOptions {
                conflict_policy: self.executor.conflict_policy,
            },
            max_loop_iterations: self.executor.max_loop_iterations,
            log_state: self.executor.log_state,
        }
    }

    pub fn limits(&self) -> FrameworkLimits {
        FrameworkLimits {
            max_data: self.limits.max_data,
            max_pipelines: self.limits.max_pipelines,
            max_tasks: self.limits.max_tasks,
        }
    }

    pub fn scene_settings(&self) -> SceneSettings {
        SceneSettings {
            spawn_per_frame: self.app.spawn_per_frame,
            ..SceneSettings::default()
        }
    }
}

/// `[executor]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorSection {
    /// `"deny"`, `"warn"` or `"allow"`.
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,

    #[serde(default = "default_max_loop_iterations")]
    pub max_loop_iterations: u32,

    /// Dump the executor state table at `debug` after every frame.
    #[serde(default)]
    pub log_state: bool,
}

fn default_max_loop_iterations() -> u32 {
    ExecutorOptions::default().max_loop_iterations
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            max_loop_iterations: default_max_loop_iterations(),
            log_state: false,
        }
    }
}

/// `[limits]` section: capacities of the id registries.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    #[serde(default = "default_max_data")]
    pub max_data: usize,
    #[serde(default = "default_max_pipelines")]
    pub max_pipelines: usize,
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
}

fn default_max_data() -> usize {
    FrameworkLimits::default().max_data
}

fn default_max_pipelines() -> usize {
    FrameworkLimits::default().max_pipelines
}

fn default_max_tasks() -> usize {
    FrameworkLimits::default().max_tasks
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_data: default_max_data(),
            max_pipelines: default_max_pipelines(),
            max_tasks: default_max_tasks(),
        }
    }
}

/// `[app]` section: how the binary drives the demo scene.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppSection {
    #[serde(default = "default_frames")]
    pub frames: u64,

    /// Frames per second; `0.0` runs unthrottled.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    #[serde(default = "default_spawn_per_frame")]
    pub spawn_per_frame: usize,

    /// Frame at which the render consumer attaches. Past the last frame it
    /// never does.
    #[serde(default = "default_attach_at")]
    pub attach_at: u64,
}

fn default_frames() -> u64 {
    120
}

fn default_frame_rate() -> f64 {
    60.0
}

fn default_spawn_per_frame() -> usize {
    SceneSettings::default().spawn_per_frame
}

fn default_attach_at() -> u64 {
    10
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            frames: default_frames(),
            frame_rate: default_frame_rate(),
            spawn_per_frame: default_spawn_per_frame(),
            attach_at: default_attach_at(),
        }
    }
}
