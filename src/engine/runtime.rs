// src/engine/runtime.rs

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::errors::Result;

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// Totals reported when the runtime exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub tasks_executed: u64,
    pub tasks_skipped: u64,
    /// Frames that left at least one pipeline stalled.
    pub stalled_frames: u64,
}

/// Async IO shell around [`CoreRuntime`].
///
/// Reads events from a channel, steps the core and acts on its commands.
/// Tasks always run on this task's thread, inside `step`.
#[derive(Debug)]
pub struct Runtime {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    summary: RunSummary,
}

impl Runtime {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>) -> Self {
        Self {
            core,
            event_rx,
            summary: RunSummary::default(),
        }
    }

    /// Main event loop.
    pub async fn run(mut self) -> Result<RunSummary> {
        info!("stageflow runtime started");

        loop {
            let Some(event) = self.event_rx.recv().await else {
                info!("runtime event channel closed; exiting");
                break;
            };
            debug!(?event, "runtime received event");

            let step = self.core.step(event)?;
            for command in step.commands {
                self.execute_command(command);
            }
            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        if !self.core.is_shut_down() {
            self.core.step(RuntimeEvent::ShutdownRequested)?;
        }
        info!(
            frames = self.summary.frames,
            executed = self.summary.tasks_executed,
            "runtime exiting"
        );
        Ok(self.summary)
    }

    fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::FrameCompleted { frame, report } => {
                self.summary.frames += 1;
                self.summary.tasks_executed += report.executed.len() as u64;
                self.summary.tasks_skipped += report.skipped.len() as u64;
                if !report.is_complete() {
                    self.summary.stalled_frames += 1;
                }
                debug!(
                    frame,
                    executed = report.executed.len(),
                    skipped = report.skipped.len(),
                    "frame completed"
                );
            }
            CoreCommand::RequestExit => {
                debug!("core issued RequestExit command");
            }
        }
    }
}

/// When the frame ticker fires and what it sends besides frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickerPlan {
    pub frames: u64,
    /// Frames per second; `0.0` sends frames back to back.
    pub frame_rate: f64,
    /// Frame number before which the render consumer attaches, if any.
    pub attach_at: Option<u64>,
}

impl TickerPlan {
    fn period(&self) -> Option<Duration> {
        (self.frame_rate > 0.0).then(|| Duration::from_secs_f64(1.0 / self.frame_rate))
    }

    /// Delta time handed to each frame.
    fn dt(&self) -> f32 {
        match self.period() {
            Some(period) => period.as_secs_f32(),
            None => 1.0 / 60.0,
        }
    }
}

/// Spawn the task that feeds frames into the runtime.
///
/// Sends `plan.frames` frame requests, attaching the render consumer at
/// `attach_at` and detaching it after the last frame, then requests shutdown.
/// Stops early if the runtime goes away.
pub fn spawn_frame_ticker(tx: mpsc::Sender<RuntimeEvent>, plan: TickerPlan) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = plan.period().map(|period| {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        let dt = plan.dt();
        let mut attached = false;

        for frame in 0..plan.frames {
            if plan.attach_at == Some(frame) {
                if tx.send(RuntimeEvent::ConsumerAttached).await.is_err() {
                    return;
                }
                attached = true;
            }
            match interval.as_mut() {
                Some(interval) => {
                    interval.tick().await;
                }
                None => tokio::task::yield_now().await,
            }
            if tx.send(RuntimeEvent::FrameRequested { dt }).await.is_err() {
                debug!(frame, "runtime gone; ticker stopping");
                return;
            }
        }

        if attached && tx.send(RuntimeEvent::ConsumerDetached).await.is_err() {
            return;
        }
        if tx.send(RuntimeEvent::ShutdownRequested).await.is_err() {
            warn!("runtime gone before shutdown was requested");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RuntimeOptions;

    #[tokio::test]
    async fn ticker_drives_runtime_to_completion() {
        let core = CoreRuntime::new(RuntimeOptions::default()).unwrap();
        let (tx, rx) = mpsc::channel(8);
        let ticker = spawn_frame_ticker(
            tx,
            TickerPlan {
                frames: 5,
                frame_rate: 0.0,
                attach_at: Some(2),
            },
        );

        let summary = Runtime::new(core, rx).run().await.unwrap();
        ticker.await.unwrap();

        assert_eq!(summary.frames, 5);
        assert_eq!(summary.stalled_frames, 0);
        assert!(summary.tasks_executed > 0);
    }

    #[tokio::test]
    async fn closed_channel_still_shuts_down() {
        let core = CoreRuntime::new(RuntimeOptions::default()).unwrap();
        let (tx, rx) = mpsc::channel(4);
        tx.send(RuntimeEvent::FrameRequested { dt: 0.1 }).await.unwrap();
        drop(tx);

        let summary = Runtime::new(core, rx).run().await.unwrap();
        assert_eq!(summary.frames, 1);
    }

    #[test]
    fn unthrottled_plan_uses_default_dt() {
        let plan = TickerPlan {
            frames: 1,
            frame_rate: 0.0,
            attach_at: None,
        };
        assert!(plan.period().is_none());
        assert!((plan.dt() - 1.0 / 60.0).abs() < f32::EPSILON);
    }
}
