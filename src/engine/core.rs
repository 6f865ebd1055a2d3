// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! [`CoreRuntime`] consumes [`RuntimeEvent`]s and drives the executor
//! synchronously. It has no channels and no Tokio types, so tests step it
//! directly.

use tracing::{debug, info, warn};

use crate::engine::{CoreCommand, CoreStep, RuntimeEvent, RuntimeOptions};
use crate::errors::Result;
use crate::exec::{Executor, FrameReport, SingleThreadedExecutor};
use crate::framework::Framework;
use crate::graph::TaskGraph;
use crate::scene::Scene;

#[derive(Debug)]
pub struct CoreRuntime {
    fw: Framework,
    executor: SingleThreadedExecutor,
    /// `None` once shut down.
    scene: Option<Scene>,
    frames: u64,
}

impl CoreRuntime {
    /// Build the framework and the demo scene, then load the task graph.
    pub fn new(options: RuntimeOptions) -> Result<Self> {
        let mut fw = Framework::with_limits(options.limits);
        let scene = Scene::build(&mut fw, options.scene)?;
        let mut executor = SingleThreadedExecutor::new(options.executor);
        executor.load(&fw)?;
        Ok(Self {
            fw,
            executor,
            scene: Some(scene),
            frames: 0,
        })
    }

    pub fn framework(&self) -> &Framework {
        &self.fw
    }

    pub fn executor(&self) -> &SingleThreadedExecutor {
        &self.executor
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn graph(&self) -> Option<&TaskGraph> {
        self.executor.graph()
    }

    /// Frames completed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_shut_down(&self) -> bool {
        self.scene.is_none()
    }

    /// Handle a single runtime event.
    ///
    /// Errors are fatal: a failed task body or a runaway loop leaves the
    /// executor in an unspecified state.
    pub fn step(&mut self, event: RuntimeEvent) -> Result<CoreStep> {
        let Some(scene) = self.scene.as_mut() else {
            debug!(?event, "event after shutdown ignored");
            return Ok(CoreStep {
                commands: Vec::new(),
                keep_running: false,
            });
        };

        match event {
            RuntimeEvent::FrameRequested { dt } => {
                scene.set_delta_time(&mut self.fw, dt)?;
                let report = self.executor.run_frame(&mut self.fw, &scene.frame_pipelines())?;
                self.frames += 1;
                Ok(frame_step(self.frames, report))
            }
            RuntimeEvent::ConsumerAttached => {
                if !scene.attach_renderer(&mut self.fw)? {
                    warn!("render consumer already attached");
                    return Ok(CoreStep::idle());
                }
                self.executor.load(&self.fw)?;
                let report = self.executor.run_frame(&mut self.fw, &scene.resync_pipelines())?;
                info!(executed = report.executed.len(), "render consumer attached and resynced");
                Ok(CoreStep::idle())
            }
            RuntimeEvent::ConsumerDetached => {
                if scene.detach_renderer(&mut self.fw) {
                    self.executor.load(&self.fw)?;
                    info!("render consumer detached");
                } else {
                    warn!("no render consumer to detach");
                }
                Ok(CoreStep::idle())
            }
            RuntimeEvent::ShutdownRequested => {
                if let Some(scene) = self.scene.take() {
                    scene.teardown(&mut self.fw);
                }
                info!(frames = self.frames, "core shut down");
                Ok(CoreStep {
                    commands: vec![CoreCommand::RequestExit],
                    keep_running: false,
                })
            }
        }
    }
}

fn frame_step(frame: u64, report: FrameReport) -> CoreStep {
    CoreStep {
        commands: vec![CoreCommand::FrameCompleted { frame, report }],
        keep_running: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::render::RenderStats;

    fn core() -> CoreRuntime {
        CoreRuntime::new(RuntimeOptions::default()).expect("core builds")
    }

    fn render_stats(core: &CoreRuntime) -> RenderStats {
        let scene = core.scene().expect("scene");
        let (data, _) = scene.render.expect("attached");
        *core.framework().data_get::<RenderStats>(data.stats).expect("stats")
    }

    #[test]
    fn frames_complete_and_count() {
        let mut core = core();
        for _ in 0..3 {
            let step = core.step(RuntimeEvent::FrameRequested { dt: 0.1 }).unwrap();
            assert!(step.keep_running);
            match &step.commands[..] {
                [CoreCommand::FrameCompleted { report, .. }] => assert!(report.is_complete()),
                other => panic!("unexpected commands: {other:?}"),
            }
        }
        assert_eq!(core.frames(), 3);
        let scene = core.scene().unwrap();
        assert_eq!(*core.framework().data_get::<u64>(scene.main.frame).unwrap(), 3);
    }

    #[test]
    fn attach_resyncs_then_tracks_changes() {
        let mut core = core();
        for _ in 0..2 {
            core.step(RuntimeEvent::FrameRequested { dt: 0.1 }).unwrap();
        }
        core.step(RuntimeEvent::ConsumerAttached).unwrap();
        let stats = render_stats(&core);
        assert_eq!(stats.resyncs, 1);
        assert_eq!(stats.frames_drawn, 0);

        core.step(RuntimeEvent::FrameRequested { dt: 0.1 }).unwrap();
        let stats = render_stats(&core);
        assert_eq!(stats.frames_drawn, 1);

        let scene = core.scene().unwrap();
        let entities = core
            .framework()
            .data_get::<Vec<crate::scene::entities::Entity>>(scene.entities.entities)
            .unwrap()
            .len();
        assert_eq!(stats.last_drawn, entities);
    }

    #[test]
    fn second_attach_is_ignored() {
        let mut core = core();
        core.step(RuntimeEvent::ConsumerAttached).unwrap();
        core.step(RuntimeEvent::ConsumerAttached).unwrap();
        assert_eq!(render_stats(&core).resyncs, 1);
    }

    #[test]
    fn detach_removes_render_tasks() {
        let mut core = core();
        let before = core.graph().unwrap().task_count();
        core.step(RuntimeEvent::ConsumerAttached).unwrap();
        assert!(core.graph().unwrap().task_count() > before);
        core.step(RuntimeEvent::ConsumerDetached).unwrap();
        assert_eq!(core.graph().unwrap().task_count(), before);
        let step = core.step(RuntimeEvent::FrameRequested { dt: 0.1 }).unwrap();
        assert!(step.keep_running);
    }

    #[test]
    fn shutdown_stops_and_ignores_later_events() {
        let mut core = core();
        let step = core.step(RuntimeEvent::ShutdownRequested).unwrap();
        assert!(!step.keep_running);
        assert_eq!(step.commands, vec![CoreCommand::RequestExit]);
        assert!(core.is_shut_down());

        let step = core.step(RuntimeEvent::FrameRequested { dt: 0.1 }).unwrap();
        assert!(!step.keep_running);
        assert!(step.commands.is_empty());
        assert_eq!(core.frames(), 0);
    }
}
