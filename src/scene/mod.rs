// src/scene/mod.rs

//! Demonstration scene used by the binary and the integration tests.
//!
//! Payloads are deliberately trivial (vectors, counters, integer handles); the
//! point is the wiring: sessions that find each other through a feature context, child
//! pipelines inside the per-frame pipeline, schedulers that cancel on empty
//! queues, and a render mirror that can attach late and resync.
//!
//! - [`entities`]: spawn queue, entity container, expiry and deletion, motion.
//! - [`render`]: render handle mirror plus its resync task.

pub mod entities;
pub mod render;

use tracing::info;

use crate::errors::Result;
use crate::framework::{FeatureInterface, Framework, Session, TaskDesc};
use crate::ids::{ContextId, DataId, PipelineId};
use crate::pipeline::{Event, Pipeline};

use entities::{EntitiesData, EntitiesPipelines};
use render::{RenderData, RenderPipelines};

/// What one setup function produced.
#[derive(Debug)]
pub struct Setup<D, P> {
    pub session: Session,
    pub data: D,
    pub pipelines: P,
}

#[derive(Debug, Clone, Copy)]
pub struct MainData {
    /// Seconds since the previous frame (`f32`), written before each frame.
    pub delta_time: DataId,
    /// Frames started so far (`u64`).
    pub frame: DataId,
}

#[derive(Debug, Clone, Copy)]
pub struct MainPipelines {
    /// Runs once per frame; everything else nests inside `Event::Run`.
    pub main: Pipeline<Event>,
    /// Run on demand when a consumer attaches.
    pub resync: Pipeline<Event>,
}

/// What the main session publishes into the scene's context.
#[derive(Debug, Clone, Copy)]
pub struct MainInterface {
    pub data: MainData,
    pub pipelines: MainPipelines,
}

impl FeatureInterface for MainInterface {
    const NAME: &'static str = "main";
}

/// Tunables of the demo scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneSettings {
    pub spawn_per_frame: usize,
    /// Seconds an entity lives.
    pub entity_ttl: f32,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            spawn_per_frame: 2,
            entity_ttl: 0.5,
        }
    }
}

pub fn setup_main(fw: &mut Framework, ctx: ContextId) -> Result<Setup<MainData, MainPipelines>> {
    let mut sb = fw.session("main");
    let delta_time = sb.data_emplace(0.0f32)?;
    let frame = sb.data_emplace(0u64)?;
    let main = sb.create_pipeline::<Event>("main")?;
    let resync = sb.create_pipeline::<Event>("resync")?;

    sb.task(
        TaskDesc::new()
            .name("Advance frame counter")
            .run_on(main.at(Event::Schedule))
            .args([frame])
            .func(|args| -> anyhow::Result<()> {
                *args.write::<u64>(0)? += 1;
                Ok(())
            }),
    )?;

    let data = MainData { delta_time, frame };
    let pipelines = MainPipelines { main, resync };
    sb.implements(ctx, MainInterface { data, pipelines })?;

    Ok(Setup {
        session: sb.finish(),
        data,
        pipelines,
    })
}

/// The composed demo scene: logic sessions, plus render sessions while a
/// consumer is attached.
#[derive(Debug)]
pub struct Scene {
    /// Where every scene session publishes its interface.
    pub context: ContextId,
    pub main: MainData,
    pub main_pipelines: MainPipelines,
    pub entities: EntitiesData,
    pub entity_pipelines: EntitiesPipelines,
    pub render: Option<(RenderData, RenderPipelines)>,
    sessions: Vec<Session>,
    render_sessions: Vec<Session>,
}

impl Scene {
    pub fn build(fw: &mut Framework, settings: SceneSettings) -> Result<Self> {
        let context = fw.context_create()?;
        let main = setup_main(fw, context)?;
        let entities = entities::setup_entities(fw, context, settings)?;
        let motion = entities::setup_motion(fw, context)?;

        info!(
            sessions = 3,
            spawn_per_frame = settings.spawn_per_frame,
            "demo scene built"
        );

        Ok(Self {
            context,
            main: main.data,
            main_pipelines: main.pipelines,
            entities: entities.data,
            entity_pipelines: entities.pipelines,
            render: None,
            sessions: vec![main.session, entities.session, motion.session],
            render_sessions: Vec::new(),
        })
    }

    /// Register the render mirror. Returns `false` if it was already there.
    pub fn attach_renderer(&mut self, fw: &mut Framework) -> Result<bool> {
        if self.render.is_some() {
            return Ok(false);
        }
        let setup = render::setup_render(fw, self.context)?;
        self.render_sessions.push(setup.session);
        self.render = Some((setup.data, setup.pipelines));
        Ok(true)
    }

    /// Tear the render mirror down. Returns `false` if nothing was attached.
    pub fn detach_renderer(&mut self, fw: &mut Framework) -> bool {
        if self.render.take().is_none() {
            return false;
        }
        fw.close_sessions(std::mem::take(&mut self.render_sessions));
        true
    }

    pub fn is_attached(&self) -> bool {
        self.render.is_some()
    }

    pub fn frame_pipelines(&self) -> [PipelineId; 1] {
        [self.main_pipelines.main.id()]
    }

    pub fn resync_pipelines(&self) -> [PipelineId; 1] {
        [self.main_pipelines.resync.id()]
    }

    pub fn set_delta_time(&self, fw: &mut Framework, dt: f32) -> Result<()> {
        *fw.data_get_mut::<f32>(self.main.delta_time)? = dt;
        Ok(())
    }

    /// Close every session, render ones first, then drop the context.
    pub fn teardown(mut self, fw: &mut Framework) {
        self.detach_renderer(fw);
        fw.close_sessions(std::mem::take(&mut self.sessions));
        fw.context_remove(self.context);
    }
}
