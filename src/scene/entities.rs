// src/scene/entities.rs

//! Entities: spawned from a request queue, moved every frame, deleted when
//! their time-to-live runs out.

use crate::errors::Result;
use crate::framework::{Arg, FeatureInterface, Framework, TaskActions, TaskDesc};
use crate::ids::{ContextId, DataId};
use crate::pipeline::{Container, Event, Pipeline, Queue};
use crate::scene::{MainInterface, SceneSettings, Setup};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub ttl: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: u64,
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub ttl: f32,
}

/// Ids created and removed during the current frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityChanges {
    pub created: Vec<u64>,
    pub removed: Vec<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct EntitiesData {
    /// `Vec<SpawnRequest>`, drained every frame.
    pub spawn_queue: DataId,
    /// `usize`
    pub spawn_per_frame: DataId,
    /// `f32`
    pub entity_ttl: DataId,
    /// `Vec<Entity>`
    pub entities: DataId,
    /// `u64`
    pub next_id: DataId,
    /// `EntityChanges`
    pub changes: DataId,
    /// `Vec<u64>`, drained every frame.
    pub delete_queue: DataId,
}

#[derive(Debug, Clone, Copy)]
pub struct EntitiesPipelines {
    pub spawn: Pipeline<Queue>,
    pub entities: Pipeline<Container>,
    pub delete: Pipeline<Queue>,
}

/// What the entities session publishes for the sessions layered on top.
#[derive(Debug, Clone, Copy)]
pub struct EntitiesInterface {
    pub data: EntitiesData,
    pub pipelines: EntitiesPipelines,
}

impl FeatureInterface for EntitiesInterface {
    const NAME: &'static str = "entities";
}

pub fn setup_entities(
    fw: &mut Framework,
    ctx: ContextId,
    settings: SceneSettings,
) -> Result<Setup<EntitiesData, EntitiesPipelines>> {
    let mut sb = fw.session("entities");
    let MainInterface {
        data: main,
        pipelines: main_pl,
    } = sb.depends_on(ctx)?;

    let data = EntitiesData {
        spawn_queue: sb.data_emplace(Vec::<SpawnRequest>::new())?,
        spawn_per_frame: sb.data_emplace(settings.spawn_per_frame)?,
        entity_ttl: sb.data_emplace(settings.entity_ttl)?,
        entities: sb.data_emplace(Vec::<Entity>::new())?,
        next_id: sb.data_emplace(0u64)?,
        changes: sb.data_emplace(EntityChanges::default())?,
        delete_queue: sb.data_emplace(Vec::<u64>::new())?,
    };
    let pl = EntitiesPipelines {
        spawn: sb.create_pipeline::<Queue>("spawn")?,
        entities: sb.create_pipeline::<Container>("entities")?,
        delete: sb.create_pipeline::<Queue>("delete")?,
    };
    let frame_window = main_pl.main.at(Event::Run);
    sb.pipeline(pl.spawn)?.parent(frame_window);
    sb.pipeline(pl.entities)?.parent(frame_window);
    sb.pipeline(pl.delete)?.parent(frame_window);

    // Spawning

    sb.task(
        TaskDesc::new()
            .name("Request spawns")
            .run_on(pl.spawn.at(Queue::Modify))
            .args([
                Arg::write(data.spawn_queue),
                Arg::read(data.spawn_per_frame),
                Arg::read(data.entity_ttl),
                Arg::read(main.frame),
            ])
            .func(|args| -> anyhow::Result<()> {
                let count = *args.read::<usize>(1)?;
                let ttl = *args.read::<f32>(2)?;
                let frame = *args.read::<u64>(3)?;
                let mut queue = args.write::<Vec<SpawnRequest>>(0)?;
                queue.extend((0..count).map(|i| {
                    let lane = i as f32;
                    SpawnRequest {
                        position: [lane, frame as f32],
                        velocity: [1.0, -lane],
                        ttl,
                    }
                }));
                Ok(())
            }),
    )?;

    sb.task(
        TaskDesc::new()
            .name("Schedule spawning")
            .schedules(pl.spawn.at(Queue::Schedule))
            .args([Arg::read(data.spawn_queue)])
            .func(|args| -> anyhow::Result<TaskActions> {
                let queue = args.read::<Vec<SpawnRequest>>(0)?;
                Ok(TaskActions::cancel_if(queue.is_empty()))
            }),
    )?;

    sb.task(
        TaskDesc::new()
            .name("Create entities")
            .run_on(pl.spawn.at(Queue::Read))
            .sync_with([pl.entities.sync(Container::New)])
            .args([
                Arg::read(data.spawn_queue),
                Arg::write(data.entities),
                Arg::write(data.next_id),
                Arg::write(data.changes),
            ])
            .func(|args| -> anyhow::Result<()> {
                let queue = args.read::<Vec<SpawnRequest>>(0)?;
                let mut entities = args.write::<Vec<Entity>>(1)?;
                let mut next_id = args.write::<u64>(2)?;
                let mut changes = args.write::<EntityChanges>(3)?;
                for req in queue.iter() {
                    let id = *next_id;
                    *next_id += 1;
                    entities.push(Entity {
                        id,
                        position: req.position,
                        velocity: req.velocity,
                        ttl: req.ttl,
                    });
                    changes.created.push(id);
                }
                Ok(())
            }),
    )?;

    sb.task(
        TaskDesc::new()
            .name("Clear spawn queue")
            .run_on(pl.spawn.at(Queue::Clear))
            .args([data.spawn_queue])
            .func(|args| -> anyhow::Result<()> {
                args.write::<Vec<SpawnRequest>>(0)?.clear();
                Ok(())
            }),
    )?;

    // Deletion

    sb.task(
        TaskDesc::new()
            .name("Find expired entities")
            .run_on(pl.delete.at(Queue::Modify))
            .sync_with([pl.entities.sync(Container::Ready)])
            .args([Arg::read(data.entities), Arg::write(data.delete_queue)])
            .func(|args| -> anyhow::Result<()> {
                let entities = args.read::<Vec<Entity>>(0)?;
                let mut queue = args.write::<Vec<u64>>(1)?;
                queue.extend(entities.iter().filter(|e| e.ttl <= 0.0).map(|e| e.id));
                Ok(())
            }),
    )?;

    sb.task(
        TaskDesc::new()
            .name("Schedule deletion")
            .schedules(pl.delete.at(Queue::Schedule))
            .args([Arg::read(data.delete_queue)])
            .func(|args| -> anyhow::Result<TaskActions> {
                Ok(TaskActions::cancel_if(args.read::<Vec<u64>>(0)?.is_empty()))
            }),
    )?;

    sb.task(
        TaskDesc::new()
            .name("Delete entities")
            .run_on(pl.delete.at(Queue::Read))
            .sync_with([pl.entities.sync(Container::Delete)])
            .args([
                Arg::read(data.delete_queue),
                Arg::write(data.entities),
                Arg::write(data.changes),
            ])
            .func(|args| -> anyhow::Result<()> {
                let queue = args.read::<Vec<u64>>(0)?;
                let mut entities = args.write::<Vec<Entity>>(1)?;
                let mut changes = args.write::<EntityChanges>(2)?;
                entities.retain(|e| !queue.contains(&e.id));
                changes.removed.extend(queue.iter().copied());
                Ok(())
            }),
    )?;

    sb.task(
        TaskDesc::new()
            .name("Clear delete queue")
            .run_on(pl.delete.at(Queue::Clear))
            .args([data.delete_queue])
            .func(|args| -> anyhow::Result<()> {
                args.write::<Vec<u64>>(0)?.clear();
                Ok(())
            }),
    )?;

    sb.task(
        TaskDesc::new()
            .name("Clear entity changes")
            .run_on(main_pl.main.at(Event::Done))
            .args([data.changes])
            .func(|args| -> anyhow::Result<()> {
                let mut changes = args.write::<EntityChanges>(0)?;
                changes.created.clear();
                changes.removed.clear();
                Ok(())
            }),
    )?;

    sb.implements(
        ctx,
        EntitiesInterface {
            data,
            pipelines: pl,
        },
    )?;

    Ok(Setup {
        session: sb.finish(),
        data,
        pipelines: pl,
    })
}

/// Motion lives in its own session; it finds everything it needs in `ctx`.
pub fn setup_motion(fw: &mut Framework, ctx: ContextId) -> Result<Setup<(), ()>> {
    let mut sb = fw.session("motion");
    let MainInterface { data: main, .. } = sb.depends_on(ctx)?;
    let EntitiesInterface {
        data: entities,
        pipelines: entities_pl,
    } = sb.depends_on(ctx)?;

    sb.task(
        TaskDesc::new()
            .name("Move entities")
            .run_on(entities_pl.entities.at(Container::Modify))
            .args([Arg::read(main.delta_time), Arg::write(entities.entities)])
            .func(|args| -> anyhow::Result<()> {
                let dt = *args.read::<f32>(0)?;
                for e in args.write::<Vec<Entity>>(1)?.iter_mut() {
                    e.position[0] += e.velocity[0] * dt;
                    e.position[1] += e.velocity[1] * dt;
                    e.ttl -= dt;
                }
                Ok(())
            }),
    )?;

    Ok(Setup {
        session: sb.finish(),
        data: (),
        pipelines: (),
    })
}
