// src/graph/validate.rs

//! Structural checks on committed tasks and pipelines.
//!
//! Produces the compact [`TaskNode`] / [`PipelineNode`] tables the event graph
//! and the executor work from.

use std::collections::{BTreeSet, HashMap};

use crate::errors::{Result, StageflowError};
use crate::framework::Framework;
use crate::graph::{PipelineNode, StageTasks, TaskNode};
use crate::ids::{KeyedVec, PipelineId, TaskId};
use crate::pipeline::PipelineStage;

pub(crate) fn collect_tasks(fw: &Framework) -> Result<KeyedVec<TaskId, Option<TaskNode>>> {
    let mut nodes = KeyedVec::new();
    nodes.resize(fw.task_capacity());

    for id in fw.task_ids() {
        let Some(desc) = fw.task(id) else {
            return Err(StageflowError::UnknownTask(id));
        };
        let name = task_label(&desc.name, id);

        let run_on = match desc.run_on.as_slice() {
            [] => return Err(StageflowError::MissingRunOn(name)),
            [one] => *one,
            many => {
                return Err(StageflowError::InvalidTask {
                    task: name,
                    reason: format!("{} run_on stages declared, expected one", many.len()),
                });
            }
        };
        check_stage(fw, run_on, &name)?;

        let mut sync_stage: HashMap<PipelineId, u8> = HashMap::new();
        for sw in &desc.sync_with {
            check_stage(fw, sw.target, &name)?;
            if let Some(prev) = sync_stage.insert(sw.target.pipeline, sw.target.stage)
                && prev != sw.target.stage
            {
                return Err(StageflowError::InvalidTask {
                    task: name,
                    reason: format!(
                        "syncs with two different stages of pipeline {:?}",
                        sw.target.pipeline
                    ),
                });
            }
        }

        let mut seen = BTreeSet::new();
        for arg in &desc.args {
            if !fw.data.contains(arg.id) {
                return Err(StageflowError::UnknownData {
                    id: arg.id,
                    context: format!("args of task '{name}'"),
                });
            }
            if !seen.insert(arg.id) {
                return Err(StageflowError::InvalidTask {
                    task: name,
                    reason: format!("data {:?} declared twice in args", arg.id),
                });
            }
        }

        nodes[id] = Some(TaskNode {
            name,
            run_on,
            sync_with: desc.sync_with.clone(),
            schedules: desc.schedules,
            args: desc.args.clone(),
        });
    }

    Ok(nodes)
}

pub(crate) fn collect_pipelines(
    fw: &Framework,
    tasks: &KeyedVec<TaskId, Option<TaskNode>>,
) -> Result<KeyedVec<PipelineId, Option<PipelineNode>>> {
    let mut nodes: KeyedVec<PipelineId, Option<PipelineNode>> = KeyedVec::new();
    nodes.resize(fw.pipeline_capacity());

    for id in fw.pipeline_ids() {
        let Some(info) = fw.pipeline_info(id) else {
            continue;
        };
        if let Some(stage) = info.wait_stage
            && stage as usize >= info.stages.len()
        {
            return Err(StageflowError::InvalidStage {
                pipeline: info.name.clone(),
                stage: stage as usize,
                stage_count: info.stages.len(),
            });
        }
        nodes[id] = Some(PipelineNode {
            name: info.name.clone(),
            stages: info.stages.clone(),
            parent: info.parent,
            loops: info.loops,
            wait_stage: info.wait_stage,
            scheduler: None,
            stage_tasks: vec![StageTasks::default(); info.stages.len()],
        });
    }

    // Parents: existence, stage range, then acyclic chains.
    for id in fw.pipeline_ids() {
        let Some(parent) = nodes[id].as_ref().and_then(|n| n.parent) else {
            continue;
        };
        let pname = nodes[id].as_ref().map(|n| n.name.clone()).unwrap_or_default();
        check_stage(fw, parent, &pname)?;
        if parent.pipeline == id {
            return Err(StageflowError::ParentCycle(pname));
        }
    }
    for id in fw.pipeline_ids() {
        let mut cursor = id;
        let mut steps = 0usize;
        while let Some(parent) = nodes[cursor].as_ref().and_then(|n| n.parent) {
            cursor = parent.pipeline;
            steps += 1;
            if cursor == id || steps > nodes.len() {
                let name = nodes[id].as_ref().map(|n| n.name.clone()).unwrap_or_default();
                return Err(StageflowError::ParentCycle(name));
            }
        }
    }
    for id in fw.pipeline_ids() {
        if let Some(parent) = nodes[id].as_ref().and_then(|n| n.parent)
            && let Some(pnode) = nodes[parent.pipeline].as_mut()
        {
            pnode.stage_tasks[parent.stage as usize].children.push(id);
        }
    }

    // Task membership per stage, schedulers.
    for (tid, node) in tasks.iter() {
        let Some(task) = node else { continue };
        let run_on = task.run_on;
        let Some(pnode) = nodes[run_on.pipeline].as_mut() else {
            continue;
        };
        if task.schedules {
            if let Some(first) = pnode.scheduler {
                let first_name = tasks[first]
                    .as_ref()
                    .map(|t| t.name.clone())
                    .unwrap_or_default();
                return Err(StageflowError::DuplicateScheduler {
                    pipeline: pnode.name.clone(),
                    first: first_name,
                    second: task.name.clone(),
                });
            }
            pnode.scheduler = Some(tid);
        }
        pnode.stage_tasks[run_on.stage as usize].run_on.push(tid);

        for sw in &task.sync_with {
            if sw.target == run_on {
                continue;
            }
            if let Some(target) = nodes[sw.target.pipeline].as_mut() {
                let syncing = &mut target.stage_tasks[sw.target.stage as usize].syncing;
                if !syncing.contains(&tid) {
                    syncing.push(tid);
                }
            }
        }
    }

    for (_, node) in nodes.iter() {
        if let Some(pnode) = node
            && pnode.loops
            && pnode.scheduler.is_none()
        {
            return Err(StageflowError::InvalidPipeline {
                pipeline: pnode.name.clone(),
                reason: "looping pipeline needs a scheduling task to end the loop".to_string(),
            });
        }
    }

    Ok(nodes)
}

fn check_stage(fw: &Framework, ps: PipelineStage, who: &str) -> Result<()> {
    let info = fw
        .pipeline_info(ps.pipeline)
        .ok_or_else(|| StageflowError::UnknownPipeline {
            id: ps.pipeline,
            context: format!("referenced by '{who}'"),
        })?;
    if ps.stage as usize >= info.stages.len() {
        return Err(StageflowError::InvalidStage {
            pipeline: info.name.clone(),
            stage: ps.stage as usize,
            stage_count: info.stages.len(),
        });
    }
    Ok(())
}

fn task_label(name: &str, id: TaskId) -> String {
    if name.is_empty() {
        format!("{id}")
    } else {
        name.to_string()
    }
}
