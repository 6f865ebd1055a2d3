#![allow(dead_code)]

use std::sync::Arc;

use stageflow::config::{ConfigFile, RawConfigFile};
use stageflow::exec::{Executor, ExecutorOptions, SingleThreadedExecutor};
use stageflow::framework::{Arg, Framework, TaskActions, TaskDesc};
use stageflow::graph::GraphOptions;
use stageflow::ids::DataId;
use stageflow::pipeline::{StageRole, StageSetInfo};
use stageflow::types::ConflictPolicy;

/// Runtime stage set from `(name, role)` pairs.
pub fn stage_set(name: &str, stages: &[(&str, StageRole)]) -> Arc<StageSetInfo> {
    let info = StageSetInfo::new(name, stages.iter().copied()).expect("valid stage set");
    Arc::new(info)
}

/// Executor with `policy` and default limits, already loaded from `fw`.
pub fn loaded_executor(fw: &Framework, policy: ConflictPolicy) -> SingleThreadedExecutor {
    let mut exec = SingleThreadedExecutor::new(ExecutorOptions {
        graph: GraphOptions {
            conflict_policy: policy,
        },
        ..ExecutorOptions::default()
    });
    exec.load(fw).expect("task graph builds");
    exec
}

/// Shared invocation log: every task built from it appends its name.
///
/// All such tasks write the same slot, so graphs using it need
/// `ConflictPolicy::Allow` unless the tasks are fully ordered.
#[derive(Debug, Clone, Copy)]
pub struct TraceLog {
    pub id: DataId,
}

impl TraceLog {
    pub fn new(fw: &mut Framework) -> Self {
        let id = fw.data_emplace(Vec::<String>::new()).expect("data slot");
        Self { id }
    }

    /// Task named `name` that records itself. Add `run_on` etc. on top.
    pub fn task(&self, name: &str) -> TaskDesc {
        let label = name.to_string();
        TaskDesc::new()
            .name(name)
            .args([Arg::write(self.id)])
            .func(move |args| -> anyhow::Result<()> {
                args.write::<Vec<String>>(0)?.push(label.clone());
                Ok(())
            })
    }

    /// Scheduler task that records itself and cancels when `cancel` is set.
    pub fn scheduler(&self, name: &str, cancel: bool) -> TaskDesc {
        let label = name.to_string();
        TaskDesc::new()
            .name(name)
            .args([Arg::write(self.id)])
            .func(move |args| -> anyhow::Result<TaskActions> {
                args.write::<Vec<String>>(0)?.push(label.clone());
                Ok(TaskActions::cancel_if(cancel))
            })
    }

    pub fn entries(&self, fw: &Framework) -> Vec<String> {
        fw.data_get::<Vec<String>>(self.id).expect("trace log").clone()
    }

    pub fn clear(&self, fw: &mut Framework) {
        fw.data_get_mut::<Vec<String>>(self.id).expect("trace log").clear();
    }

    /// Position of `name` in the log.
    pub fn position(&self, fw: &Framework, name: &str) -> Option<usize> {
        self.entries(fw).iter().position(|e| e == name)
    }
}

/// Task named `name` that increments the `u64` in `counter`.
pub fn counter_task(name: &str, counter: DataId) -> TaskDesc {
    TaskDesc::new()
        .name(name)
        .args([Arg::write(counter)])
        .func(|args| -> anyhow::Result<()> {
            *args.write::<u64>(0)? += 1;
            Ok(())
        })
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.config.executor.conflict_policy = policy;
        self
    }

    pub fn max_loop_iterations(mut self, n: u32) -> Self {
        self.config.executor.max_loop_iterations = n;
        self
    }

    pub fn max_tasks(mut self, n: usize) -> Self {
        self.config.limits.max_tasks = n;
        self
    }

    pub fn frames(mut self, n: u64) -> Self {
        self.config.app.frames = n;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
