// src/scene/render.rs

//! Render mirror: one integer handle per live entity.
//!
//! Per-frame tasks only look at the frame's change lists, so a mirror that
//! attaches late starts from an explicit resync of the full entity list.

use std::collections::BTreeMap;

use crate::errors::Result;
use crate::framework::{Arg, Framework, TaskDesc};
use crate::ids::{ContextId, DataId};
use crate::pipeline::{Container, Event, Pipeline, StageSet};
use crate::scene::entities::{EntitiesInterface, Entity, EntityChanges};
use crate::scene::{MainInterface, Setup};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Add,
    Remove,
    Draw,
}

impl StageSet for RenderStage {
    const NAME: &'static str = "Render";
    const STAGES: &'static [Self] = &[RenderStage::Add, RenderStage::Remove, RenderStage::Draw];

    fn name(self) -> &'static str {
        match self {
            RenderStage::Add => "Add",
            RenderStage::Remove => "Remove",
            RenderStage::Draw => "Draw",
        }
    }
}

pub type Handles = BTreeMap<u64, u32>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames_drawn: u64,
    pub handles_created: u64,
    pub handles_removed: u64,
    pub resyncs: u64,
    /// Handles drawn in the last frame.
    pub last_drawn: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderData {
    /// `Handles`: entity id to render handle.
    pub handles: DataId,
    /// `u32`
    pub next_handle: DataId,
    /// `RenderStats`
    pub stats: DataId,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPipelines {
    pub render: Pipeline<RenderStage>,
}

pub fn setup_render(fw: &mut Framework, ctx: ContextId) -> Result<Setup<RenderData, RenderPipelines>> {
    let mut sb = fw.session("render");
    let MainInterface {
        pipelines: main_pl, ..
    } = sb.depends_on(ctx)?;
    let EntitiesInterface {
        data: entities,
        pipelines: entities_pl,
    } = sb.depends_on(ctx)?;

    let data = RenderData {
        handles: sb.data_emplace(Handles::new())?,
        next_handle: sb.data_emplace(0u32)?,
        stats: sb.data_emplace(RenderStats::default())?,
    };
    let render = sb.create_pipeline::<RenderStage>("render")?;
    sb.pipeline(render)?.parent(main_pl.main.at(Event::Run));

    sb.task(
        TaskDesc::new()
            .name("Add render handles")
            .run_on(render.at(RenderStage::Add))
            .sync_with([entities_pl.entities.sync(Container::Ready)])
            .args([
                Arg::read(entities.changes),
                Arg::write(data.handles),
                Arg::write(data.next_handle),
                Arg::write(data.stats),
            ])
            .func(|args| -> anyhow::Result<()> {
                let changes = args.read::<EntityChanges>(0)?;
                let mut handles = args.write::<Handles>(1)?;
                let mut next = args.write::<u32>(2)?;
                let mut stats = args.write::<RenderStats>(3)?;
                for id in &changes.created {
                    handles.insert(*id, *next);
                    *next += 1;
                    stats.handles_created += 1;
                }
                Ok(())
            }),
    )?;

    sb.task(
        TaskDesc::new()
            .name("Remove render handles")
            .run_on(render.at(RenderStage::Remove))
            .sync_with([entities_pl.entities.sync(Container::Clear)])
            .args([
                Arg::read(entities.changes),
                Arg::write(data.handles),
                Arg::write(data.stats),
            ])
            .func(|args| -> anyhow::Result<()> {
                let changes = args.read::<EntityChanges>(0)?;
                let mut handles = args.write::<Handles>(1)?;
                let mut stats = args.write::<RenderStats>(2)?;
                for id in &changes.removed {
                    if handles.remove(id).is_some() {
                        stats.handles_removed += 1;
                    }
                }
                Ok(())
            }),
    )?;

    sb.task(
        TaskDesc::new()
            .name("Draw")
            .run_on(render.at(RenderStage::Draw))
            .args([Arg::read(data.handles), Arg::write(data.stats)])
            .func(|args| -> anyhow::Result<()> {
                let drawn = args.read::<Handles>(0)?.len();
                let mut stats = args.write::<RenderStats>(1)?;
                stats.frames_drawn += 1;
                stats.last_drawn = drawn;
                Ok(())
            }),
    )?;

    // Outside a frame the main pipeline is idle and this runs right away;
    // inside one it waits until the frame's entity work is done.
    sb.task(
        TaskDesc::new()
            .name("Resync render handles")
            .run_on(main_pl.resync.at(Event::Run))
            .sync_with([main_pl.main.use_or_run(Event::Done)])
            .args([
                Arg::read(entities.entities),
                Arg::write(data.handles),
                Arg::write(data.next_handle),
                Arg::write(data.stats),
            ])
            .func(|args| -> anyhow::Result<()> {
                let entities = args.read::<Vec<Entity>>(0)?;
                let mut handles = args.write::<Handles>(1)?;
                let mut next = args.write::<u32>(2)?;
                handles.clear();
                *next = 0;
                for e in entities.iter() {
                    handles.insert(e.id, *next);
                    *next += 1;
                }
                args.write::<RenderStats>(3)?.resyncs += 1;
                Ok(())
            }),
    )?;

    Ok(Setup {
        session: sb.finish(),
        data,
        pipelines: RenderPipelines { render },
    })
}
