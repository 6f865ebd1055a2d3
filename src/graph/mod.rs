// src/graph/mod.rs

//! Task graph finalization.
//!
//! [`TaskGraph::build`] is the one step that turns committed registrations into
//! something the executor can walk:
//!
//! - [`validate`] checks every task and pipeline and builds per-stage lists.
//! - [`events`] builds the event graph with `petgraph`, rejects deadlocks and
//!   runs the static access-conflict check.
//!
//! The result is immutable and tagged with the framework revision it was built
//! from.

pub(crate) mod events;
pub(crate) mod validate;

use std::fmt;
use std::sync::Arc;

use petgraph::algo::has_path_connecting;
use tracing::{debug, info};

use crate::errors::Result;
use crate::framework::{Arg, Framework};
use crate::ids::{KeyedVec, PipelineId, StageId, TaskId};
use crate::pipeline::{PipelineStage, StageSetInfo, SyncWith};
use crate::types::ConflictPolicy;

use events::{EventGraph, EventNode};

/// Knobs for [`TaskGraph::build`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphOptions {
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Clone)]
pub(crate) struct TaskNode {
    pub name: String,
    pub run_on: PipelineStage,
    pub sync_with: Vec<SyncWith>,
    pub schedules: bool,
    pub args: Vec<Arg>,
}

/// Tasks and children attached to one stage.
#[derive(Debug, Clone, Default)]
pub(crate) struct StageTasks {
    /// Tasks triggered by this stage, in registration order.
    pub run_on: Vec<TaskId>,
    /// Tasks triggered elsewhere that hold this stage open.
    pub syncing: Vec<TaskId>,
    /// Child pipelines started when this stage is entered.
    pub children: Vec<PipelineId>,
}

#[derive(Debug, Clone)]
pub(crate) struct PipelineNode {
    pub name: String,
    pub stages: Arc<StageSetInfo>,
    pub parent: Option<PipelineStage>,
    pub loops: bool,
    pub wait_stage: Option<StageId>,
    pub scheduler: Option<TaskId>,
    pub stage_tasks: Vec<StageTasks>,
}

/// Validated, acyclic view of everything registered in a [`Framework`].
#[derive(Debug)]
pub struct TaskGraph {
    revision: u64,
    pipelines: KeyedVec<PipelineId, Option<PipelineNode>>,
    tasks: KeyedVec<TaskId, Option<TaskNode>>,
    top_level: Vec<PipelineId>,
    order: Vec<TaskId>,
    events: EventGraph,
}

impl TaskGraph {
    pub fn build(fw: &Framework, options: &GraphOptions) -> Result<Self> {
        let tasks = validate::collect_tasks(fw)?;
        let pipelines = validate::collect_pipelines(fw, &tasks)?;

        let events = events::build_event_graph(&pipelines, &tasks);
        let order = events::task_order(&events, &pipelines, &tasks)?;
        let conflicts = events::check_access_conflicts(&events, &tasks, options.conflict_policy)?;

        let top_level = pipelines
            .iter()
            .filter_map(|(id, node)| node.as_ref().filter(|n| n.parent.is_none()).map(|_| id))
            .collect();

        info!(
            pipelines = fw.pipeline_ids().count(),
            tasks = order.len(),
            events = events.node_count(),
            conflicts,
            "task graph built"
        );

        Ok(Self {
            revision: fw.revision(),
            pipelines,
            tasks,
            top_level,
            order,
            events,
        })
    }

    /// Framework revision this graph was built from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Pipelines without a parent; the only ones `run` accepts.
    pub fn top_level(&self) -> &[PipelineId] {
        &self.top_level
    }

    /// One valid static execution order of all tasks.
    pub fn order(&self) -> &[TaskId] {
        &self.order
    }

    pub fn task_count(&self) -> usize {
        self.order.len()
    }

    pub fn pipeline_name(&self, id: PipelineId) -> &str {
        self.pipeline(id).map(|p| p.name.as_str()).unwrap_or("?")
    }

    pub fn task_name(&self, id: TaskId) -> &str {
        self.task(id).map(|t| t.name.as_str()).unwrap_or("?")
    }

    pub fn parent_of(&self, id: PipelineId) -> Option<PipelineStage> {
        self.pipeline(id).and_then(|p| p.parent)
    }

    /// True when every valid execution runs `a` before `b`.
    pub fn precedes(&self, a: TaskId, b: TaskId) -> bool {
        let (a, b) = (EventNode::Task(a), EventNode::Task(b));
        self.events.contains_node(a)
            && self.events.contains_node(b)
            && a != b
            && has_path_connecting(&self.events, a, b, None)
    }

    pub(crate) fn pipeline(&self, id: PipelineId) -> Option<&PipelineNode> {
        self.pipelines.get(id).and_then(Option::as_ref)
    }

    pub(crate) fn task(&self, id: TaskId) -> Option<&TaskNode> {
        self.tasks.get(id).and_then(Option::as_ref)
    }

    pub(crate) fn pipelines(&self) -> impl Iterator<Item = (PipelineId, &PipelineNode)> {
        self.pipelines
            .iter()
            .filter_map(|(id, node)| node.as_ref().map(|n| (id, n)))
    }

    pub(crate) fn pipeline_capacity(&self) -> usize {
        self.pipelines.len()
    }

    pub(crate) fn task_capacity(&self) -> usize {
        self.tasks.len()
    }

    fn stage_label(&self, ps: PipelineStage) -> String {
        match self.pipeline(ps.pipeline) {
            Some(pl) => format!("{}:{}", pl.name, pl.stages.stage_name(ps.stage)),
            None => format!("{:?}:{}", ps.pipeline, ps.stage),
        }
    }

    fn fmt_pipeline(&self, f: &mut fmt::Formatter<'_>, id: PipelineId, depth: usize) -> fmt::Result {
        let Some(pl) = self.pipeline(id) else {
            return Ok(());
        };
        let stages: Vec<&str> = pl.stages.stage_names().collect();
        write!(f, "{:indent$}- {} ({:?}) [{}]", "", pl.name, id, stages.join(" "), indent = depth * 2 + 2)?;
        if pl.loops {
            write!(f, " loops")?;
        }
        if let Some(stage) = pl.wait_stage {
            write!(f, " waits-at:{}", pl.stages.stage_name(stage))?;
        }
        if let Some(sched) = pl.scheduler {
            write!(f, " scheduler:'{}'", self.task_name(sched))?;
        }
        writeln!(f)?;
        for stage in &pl.stage_tasks {
            for child in &stage.children {
                self.fmt_pipeline(f, *child, depth + 1)?;
            }
        }
        Ok(())
    }
}

/// Dry-run listing: the pipeline tree, then tasks in static order.
impl fmt::Display for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pipelines:")?;
        for id in &self.top_level {
            self.fmt_pipeline(f, *id, 0)?;
        }

        writeln!(f)?;
        writeln!(f, "tasks ({}), static order:", self.order.len())?;
        for (pos, id) in self.order.iter().enumerate() {
            let Some(task) = self.task(*id) else { continue };
            write!(f, "  {:>3}. {}", pos + 1, task.name)?;
            write!(f, "  run_on={}", self.stage_label(task.run_on))?;
            if task.schedules {
                write!(f, " (scheduler)")?;
            }
            for sw in &task.sync_with {
                write!(f, " sync={}/{:?}", self.stage_label(sw.target), sw.mode)?;
            }
            if !task.args.is_empty() {
                let args: Vec<String> = task
                    .args
                    .iter()
                    .map(|a| format!("{:?}:{:?}", a.id, a.access))
                    .collect();
                write!(f, " args=[{}]", args.join(", "))?;
            }
            writeln!(f)?;
        }
        debug!(tasks = self.order.len(), "task graph listing rendered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageflowError;
    use crate::framework::{Arg, TaskDesc};
    use crate::pipeline::{Container, Event, Queue};

    fn build(fw: &Framework) -> Result<TaskGraph> {
        TaskGraph::build(fw, &GraphOptions::default())
    }

    #[test]
    fn order_follows_stage_chain_and_sync() {
        let mut fw = Framework::new();
        let main = fw.create_pipeline::<Event>("main").unwrap();
        let items = fw.create_pipeline::<Container>("items").unwrap();

        let late = fw
            .add_task(
                TaskDesc::new()
                    .name("late")
                    .run_on(main.at(Event::Done))
                    .sync_with([items.at(Container::Ready)]),
            )
            .unwrap()
            .id;
        let early = fw
            .add_task(TaskDesc::new().name("early").run_on(items.at(Container::New)))
            .unwrap()
            .id;

        let graph = build(&fw).unwrap();
        assert!(graph.precedes(early, late));
        assert!(!graph.precedes(late, early));
        let pos = |t| graph.order().iter().position(|x| *x == t).unwrap();
        assert!(pos(early) < pos(late));
        assert_eq!(graph.top_level(), &[main.id(), items.id()]);
    }

    #[test]
    fn syncing_backwards_on_own_pipeline_is_a_deadlock() {
        let mut fw = Framework::new();
        let main = fw.create_pipeline::<Event>("main").unwrap();
        fw.add_task(
            TaskDesc::new()
                .name("stuck")
                .run_on(main.at(Event::Done))
                .sync_with([main.at(Event::Schedule)]),
        )
        .unwrap();

        match build(&fw) {
            Err(StageflowError::DeadlockCycle(msg)) => assert!(!msg.is_empty()),
            other => panic!("expected deadlock, got {other:?}"),
        }
    }

    #[test]
    fn crossed_syncs_between_pipelines_deadlock() {
        let mut fw = Framework::new();
        let a = fw.create_pipeline::<Event>("a").unwrap();
        let b = fw.create_pipeline::<Event>("b").unwrap();
        fw.add_task(
            TaskDesc::new()
                .name("a-late")
                .run_on(a.at(Event::Done))
                .sync_with([b.at(Event::Schedule)]),
        )
        .unwrap();
        fw.add_task(
            TaskDesc::new()
                .name("b-late")
                .run_on(b.at(Event::Done))
                .sync_with([a.at(Event::Schedule)]),
        )
        .unwrap();

        assert!(matches!(build(&fw), Err(StageflowError::DeadlockCycle(_))));
    }

    #[test]
    fn unordered_writers_are_denied_by_default() {
        let mut fw = Framework::new();
        let main = fw.create_pipeline::<Event>("main").unwrap();
        let shared = fw.data_emplace(0u32).unwrap();
        for name in ["w1", "w2"] {
            fw.add_task(TaskDesc::new().name(name).run_on(main.at(Event::Run)).args([shared]))
                .unwrap();
        }

        match build(&fw) {
            Err(StageflowError::AccessConflict { first, second, data }) => {
                assert_eq!((first.as_str(), second.as_str()), ("w1", "w2"));
                assert_eq!(data, shared);
            }
            other => panic!("expected access conflict, got {other:?}"),
        }

        let warn = GraphOptions {
            conflict_policy: ConflictPolicy::Warn,
        };
        assert!(TaskGraph::build(&fw, &warn).is_ok());
    }

    #[test]
    fn readers_and_ordered_writers_do_not_conflict() {
        let mut fw = Framework::new();
        let q = fw.create_pipeline::<Queue>("requests").unwrap();
        let d = fw.data_emplace(Vec::<u32>::new()).unwrap();
        fw.add_task(TaskDesc::new().name("push").run_on(q.at(Queue::Modify)).args([d]))
            .unwrap();
        fw.add_task(TaskDesc::new().name("r1").run_on(q.at(Queue::Read)).args([Arg::read(d)]))
            .unwrap();
        fw.add_task(TaskDesc::new().name("r2").run_on(q.at(Queue::Read)).args([Arg::read(d)]))
            .unwrap();
        fw.add_task(TaskDesc::new().name("clear").run_on(q.at(Queue::Clear)).args([d]))
            .unwrap();

        assert!(build(&fw).is_ok());
    }

    #[test]
    fn structural_errors_are_reported() {
        let mut fw = Framework::new();
        let main = fw.create_pipeline::<Event>("main").unwrap();
        let d = fw.data_emplace(0u8).unwrap();

        let t = fw.add_task(TaskDesc::new().name("no-trigger")).unwrap().id;
        assert!(matches!(build(&fw), Err(StageflowError::MissingRunOn(n)) if n == "no-trigger"));
        fw.remove_task(t);

        let t = fw
            .add_task(TaskDesc::new().name("dup").run_on(main.at(Event::Run)).args([d, d]))
            .unwrap()
            .id;
        assert!(matches!(build(&fw), Err(StageflowError::InvalidTask { .. })));
        fw.remove_task(t);

        let t = fw
            .add_task(TaskDesc::new().name("range").run_on(PipelineStage::new(main.id(), 9)))
            .unwrap()
            .id;
        assert!(matches!(
            build(&fw),
            Err(StageflowError::InvalidStage { stage: 9, stage_count: 3, .. })
        ));
        fw.remove_task(t);

        fw.add_task(TaskDesc::new().name("s1").schedules(main.at(Event::Schedule)))
            .unwrap();
        fw.add_task(TaskDesc::new().name("s2").schedules(main.at(Event::Run)))
            .unwrap();
        assert!(matches!(build(&fw), Err(StageflowError::DuplicateScheduler { .. })));
    }

    #[test]
    fn parent_cycles_and_unscheduled_loops_are_rejected() {
        let mut fw = Framework::new();
        let a = fw.create_pipeline::<Event>("a").unwrap();
        let b = fw.create_pipeline::<Event>("b").unwrap();
        fw.pipeline(a).unwrap().parent(b.at(Event::Run));
        fw.pipeline(b).unwrap().parent(a.at(Event::Run));
        assert!(matches!(build(&fw), Err(StageflowError::ParentCycle(_))));

        let mut fw = Framework::new();
        let l = fw.create_pipeline::<Event>("loop").unwrap();
        fw.pipeline(l).unwrap().loops(true);
        assert!(matches!(build(&fw), Err(StageflowError::InvalidPipeline { .. })));
    }

    #[test]
    fn listing_shows_tree_and_order() {
        let mut fw = Framework::new();
        let main = fw.create_pipeline::<Event>("main").unwrap();
        let child = fw.create_pipeline::<Container>("child").unwrap();
        fw.pipeline(child).unwrap().parent(main.at(Event::Run));
        fw.add_task(TaskDesc::new().name("decide").schedules(main.at(Event::Schedule)))
            .unwrap();

        let text = build(&fw).unwrap().to_string();
        assert!(text.contains("- main"));
        assert!(text.contains("    - child"));
        assert!(text.contains("decide  run_on=main:Schedule (scheduler)"));
    }
}
