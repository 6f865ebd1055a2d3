// src/graph/events.rs

//! The event graph: stage entries, stage exits and task runs as nodes, "must
//! happen before" as edges.
//!
//! Any cycle means no execution order exists (a deadlock at build time). The
//! same graph answers "are these two tasks ordered?" for the access check.

use std::collections::BTreeMap;

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::errors::{Result, StageflowError};
use crate::framework::Access;
use crate::graph::{PipelineNode, TaskNode};
use crate::ids::{DataId, KeyedVec, PipelineId, TaskId};
use crate::pipeline::PipelineStage;
use crate::types::ConflictPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum EventNode {
    Enter(PipelineStage),
    Exit(PipelineStage),
    Task(TaskId),
}

pub(crate) type EventGraph = DiGraphMap<EventNode, ()>;

pub(crate) fn build_event_graph(
    pipelines: &KeyedVec<PipelineId, Option<PipelineNode>>,
    tasks: &KeyedVec<TaskId, Option<TaskNode>>,
) -> EventGraph {
    let mut graph = EventGraph::new();

    // Stage chain of every pipeline.
    for (pid, node) in pipelines.iter() {
        let Some(pl) = node else { continue };
        for stage in 0..pl.stages.len() {
            let ps = PipelineStage::new(pid, stage as u8);
            graph.add_edge(EventNode::Enter(ps), EventNode::Exit(ps), ());
            if stage + 1 < pl.stages.len() {
                let next = PipelineStage::new(pid, stage as u8 + 1);
                graph.add_edge(EventNode::Exit(ps), EventNode::Enter(next), ());
            }
        }
    }

    // A child runs entirely inside its parent's stage.
    for (cid, node) in pipelines.iter() {
        let Some(child) = node else { continue };
        let Some(parent) = child.parent else { continue };
        let first = PipelineStage::new(cid, 0);
        let last = PipelineStage::new(cid, child.stages.last());
        graph.add_edge(EventNode::Enter(parent), EventNode::Enter(first), ());
        graph.add_edge(EventNode::Exit(last), EventNode::Exit(parent), ());
    }

    // Tasks sit inside every stage they touch.
    for (tid, node) in tasks.iter() {
        let Some(task) = node else { continue };
        let t = EventNode::Task(tid);
        graph.add_edge(EventNode::Enter(task.run_on), t, ());
        graph.add_edge(t, EventNode::Exit(task.run_on), ());
        for sw in &task.sync_with {
            graph.add_edge(EventNode::Enter(sw.target), t, ());
            graph.add_edge(t, EventNode::Exit(sw.target), ());
        }
    }

    // A scheduler decides before anything else on its stage happens.
    for (pid, node) in pipelines.iter() {
        let Some(pl) = node else { continue };
        let Some(sched) = pl.scheduler else { continue };
        let Some(stage) = tasks[sched].as_ref().map(|t| t.run_on.stage) else {
            continue;
        };
        let lists = &pl.stage_tasks[stage as usize];
        for other in lists.run_on.iter().chain(lists.syncing.iter()) {
            if *other != sched {
                graph.add_edge(EventNode::Task(sched), EventNode::Task(*other), ());
            }
        }
        for child in &lists.children {
            let first = PipelineStage::new(*child, 0);
            graph.add_edge(EventNode::Task(sched), EventNode::Enter(first), ());
        }
        debug!(pipeline = ?pid, scheduler = ?sched, "scheduler edges added");
    }

    graph
}

/// Topological order of the tasks, or the deadlock that prevents one.
pub(crate) fn task_order(
    graph: &EventGraph,
    pipelines: &KeyedVec<PipelineId, Option<PipelineNode>>,
    tasks: &KeyedVec<TaskId, Option<TaskNode>>,
) -> Result<Vec<TaskId>> {
    match toposort(graph, None) {
        Ok(order) => Ok(order
            .into_iter()
            .filter_map(|node| match node {
                EventNode::Task(t) => Some(t),
                _ => None,
            })
            .collect()),
        Err(cycle) => Err(StageflowError::DeadlockCycle(describe(
            cycle.node_id(),
            pipelines,
            tasks,
        ))),
    }
}

/// Check every unordered pair of tasks sharing a slot with write access.
pub(crate) fn check_access_conflicts(
    graph: &EventGraph,
    tasks: &KeyedVec<TaskId, Option<TaskNode>>,
    policy: ConflictPolicy,
) -> Result<usize> {
    if policy == ConflictPolicy::Allow {
        return Ok(0);
    }

    let mut users: BTreeMap<DataId, Vec<(TaskId, Access)>> = BTreeMap::new();
    for (tid, node) in tasks.iter() {
        let Some(task) = node else { continue };
        for arg in &task.args {
            users.entry(arg.id).or_default().push((tid, arg.access));
        }
    }

    let mut conflicts = 0;
    for (data, list) in &users {
        for (i, &(a, access_a)) in list.iter().enumerate() {
            for &(b, access_b) in &list[i + 1..] {
                if access_a == Access::Read && access_b == Access::Read {
                    continue;
                }
                let (ta, tb) = (EventNode::Task(a), EventNode::Task(b));
                if has_path_connecting(graph, ta, tb, None)
                    || has_path_connecting(graph, tb, ta, None)
                {
                    continue;
                }

                let first = name_of(tasks, a);
                let second = name_of(tasks, b);
                match policy {
                    ConflictPolicy::Deny => {
                        return Err(StageflowError::AccessConflict {
                            first,
                            second,
                            data: *data,
                        });
                    }
                    ConflictPolicy::Warn => {
                        warn!(%first, %second, ?data, "unordered tasks share data with write access");
                        conflicts += 1;
                    }
                    ConflictPolicy::Allow => {}
                }
            }
        }
    }
    Ok(conflicts)
}

pub(crate) fn describe(
    node: EventNode,
    pipelines: &KeyedVec<PipelineId, Option<PipelineNode>>,
    tasks: &KeyedVec<TaskId, Option<TaskNode>>,
) -> String {
    let stage = |ps: PipelineStage| {
        pipelines
            .get(ps.pipeline)
            .and_then(Option::as_ref)
            .map(|pl| format!("{}:{}", pl.name, pl.stages.stage_name(ps.stage)))
            .unwrap_or_else(|| format!("{:?}:{}", ps.pipeline, ps.stage))
    };
    match node {
        EventNode::Enter(ps) => format!("entering stage {}", stage(ps)),
        EventNode::Exit(ps) => format!("leaving stage {}", stage(ps)),
        EventNode::Task(t) => format!("task '{}'", name_of(tasks, t)),
    }
}

fn name_of(tasks: &KeyedVec<TaskId, Option<TaskNode>>, id: TaskId) -> String {
    tasks
        .get(id)
        .and_then(Option::as_ref)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| id.to_string())
}
