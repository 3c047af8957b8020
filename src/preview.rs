use std::collections::HashSet;

use anyhow::{bail, Result};
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::PreviewConfig;
use crate::events::{DespawnReason, EventBus, PreviewEvent};
use crate::model::{ObjectId, StageData};
use crate::scripts::{ScriptContext, ScriptEntityData, ScriptResult, ScriptRuntime, StageScriptData};
use crate::store::{ObjectStore, StoreError};

/// One live enemy instance spawned from a stage placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewEntity {
    pub slot: usize,
    pub index: u32,
    pub enemy_id: ObjectId,
    pub instance_name: String,
    pub spawn_position: Vec2,
    pub position: Vec2,
    pub age: f32,
    pub lifetime: Option<f32>,
}

/// Frame-stepped simulation of a stage's enemy roster.
///
/// The preview never edits the project; it reads the current snapshot each frame so edits made
/// between frames are picked up. Call [`ScriptRuntime::refresh_cache`] after structural edits.
#[derive(Debug)]
pub struct StagePreview {
    stage_id: ObjectId,
    age: f32,
    spawned: Vec<u32>,
    entities: Vec<PreviewEntity>,
    events: EventBus,
    reported_scripts: HashSet<ObjectId>,
    spawn_limit: u32,
}

impl StagePreview {
    pub fn new(stage_id: ObjectId) -> Self {
        Self {
            stage_id,
            age: 0.0,
            spawned: Vec::new(),
            entities: Vec::new(),
            events: EventBus::default(),
            reported_scripts: HashSet::new(),
            spawn_limit: PreviewConfig::default().max_spawns_per_frame,
        }
    }

    /// Caps how many instances one `step` may spawn. Zero is treated as one.
    pub fn with_spawn_limit(mut self, limit: u32) -> Self {
        self.spawn_limit = limit.max(1);
        self
    }

    pub fn stage_id(&self) -> ObjectId {
        self.stage_id
    }

    pub fn age(&self) -> f32 {
        self.age
    }

    pub fn entities(&self) -> &[PreviewEntity] {
        &self.entities
    }

    pub fn take_events(&mut self) -> Vec<PreviewEvent> {
        self.events.drain()
    }

    /// True once the stage length has elapsed, or when the stage no longer exists.
    pub fn is_finished(&self, store: &ObjectStore) -> bool {
        match store.object_by_id(self.stage_id) {
            Some(entity) => entity.as_stage().map_or(true, |stage| self.age >= stage.length_seconds),
            None => true,
        }
    }

    /// Advances the preview by `dt` seconds. Script problems are logged and reported as events;
    /// they never abort the frame.
    pub fn step(&mut self, store: &ObjectStore, runtime: &mut ScriptRuntime, dt: f32) {
        let Some(stage_entity) = store.object_by_id(self.stage_id) else {
            return;
        };
        let Some(stage) = stage_entity.as_stage() else {
            return;
        };

        self.age += dt;
        for entity in &mut self.entities {
            entity.age += dt;
        }
        self.spawn_due(stage);

        let stage_data = StageScriptData { size: stage.size, age: self.age };
        let entities = std::mem::take(&mut self.entities);
        for mut entity in entities {
            if entity.lifetime.is_some_and(|lifetime| entity.age >= lifetime) {
                self.events.push(PreviewEvent::EnemyDespawned {
                    slot: entity.slot,
                    index: entity.index,
                    reason: DespawnReason::Expired,
                });
                continue;
            }

            if let Some(result) = self.run_script(store, runtime, &entity, stage_data, dt) {
                if let Some(position) = result.position {
                    entity.position = position.into();
                }
                if result.fires() {
                    self.events.push(PreviewEvent::EnemyFired {
                        slot: entity.slot,
                        index: entity.index,
                        position: entity.position,
                    });
                }
                if !result.is_alive() {
                    self.events.push(PreviewEvent::EnemyDespawned {
                        slot: entity.slot,
                        index: entity.index,
                        reason: DespawnReason::Killed,
                    });
                    continue;
                }
            }
            self.entities.push(entity);
        }
    }

    fn spawn_due(&mut self, stage: &StageData) {
        self.spawned.resize(stage.enemies.len(), 0);
        let mut budget = self.spawn_limit;
        for (slot, placement) in stage.enemies.iter().enumerate() {
            while self.spawned[slot] < placement.spawn_amount {
                let index = self.spawned[slot];
                let spawn_at = placement.spawn_time + placement.spawn_rate.max(0.0) * index as f32;
                if spawn_at > self.age {
                    break;
                }
                if budget == 0 {
                    log::debug!(
                        target: "preview",
                        "spawn limit of {} reached at {:.2}s",
                        self.spawn_limit,
                        self.age
                    );
                    return;
                }
                budget -= 1;
                self.spawned[slot] += 1;

                let position = Vec2::from(placement.position);
                self.entities.push(PreviewEntity {
                    slot,
                    index,
                    enemy_id: placement.id,
                    instance_name: placement.instance_name.clone(),
                    spawn_position: position,
                    position,
                    age: self.age - spawn_at,
                    lifetime: (placement.lifetime >= 0.0).then_some(placement.lifetime),
                });
                self.events.push(PreviewEvent::EnemySpawned { slot, index, enemy_id: placement.id, position });
            }
        }
    }

    fn run_script(
        &mut self,
        store: &ObjectStore,
        runtime: &mut ScriptRuntime,
        entity: &PreviewEntity,
        stage: StageScriptData,
        dt: f32,
    ) -> Option<ScriptResult> {
        // Dangling enemy references and scriptless enemies simply stay put.
        let enemy = store.object_by_id(entity.enemy_id)?;
        let script_id = enemy.script_id().filter(|id| *id >= 0)?;

        let context = ScriptContext {
            stage,
            delta: dt,
            entity: ScriptEntityData {
                age: entity.age,
                spawn_position: entity.spawn_position.into(),
                position: entity.position.into(),
                index: entity.index,
            },
        };

        let outcome = runtime.methods(script_id).and_then(|mut methods| methods.update(&context));
        match outcome {
            Ok(result) => Some(result),
            Err(err) => {
                if self.reported_scripts.insert(script_id) {
                    log::warn!(target: "preview", "enemy '{}' script {script_id}: {err}", enemy.name);
                    self.events.push(PreviewEvent::ScriptFailed { script_id, message: err.to_string() });
                }
                None
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntitySummary {
    pub instance_name: String,
    pub slot: usize,
    pub index: u32,
    pub enemy_id: ObjectId,
    pub position: [f32; 2],
    pub age: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSummary {
    pub stage_id: ObjectId,
    pub stage_name: String,
    pub frames: u32,
    pub age: f32,
    pub events: Vec<String>,
    pub entities: Vec<EntitySummary>,
}

/// Runs up to `config.frames` frames of `stage_id` (stopping at the end of the stage) and
/// summarises what happened.
pub fn run_preview(
    store: &ObjectStore,
    runtime: &mut ScriptRuntime,
    stage_id: ObjectId,
    config: &PreviewConfig,
) -> Result<PreviewSummary> {
    let stage = store.object_by_id(stage_id).ok_or(StoreError::ObjectNotFound(stage_id))?;
    if stage.as_stage().is_none() {
        bail!("object {stage_id} ('{}') is a {}, not a stage", stage.name, stage.kind());
    }

    let dt = config.frame_delta();
    let mut preview = StagePreview::new(stage_id).with_spawn_limit(config.max_spawns_per_frame);
    let mut events = Vec::new();
    let mut ran = 0;
    while ran < config.frames && !preview.is_finished(store) {
        preview.step(store, runtime, dt);
        events.extend(preview.take_events().iter().map(ToString::to_string));
        ran += 1;
    }

    let entities = preview
        .entities()
        .iter()
        .map(|entity| EntitySummary {
            instance_name: entity.instance_name.clone(),
            slot: entity.slot,
            index: entity.index,
            enemy_id: entity.enemy_id,
            position: [entity.position.x, entity.position.y],
            age: entity.age,
        })
        .collect();

    Ok(PreviewSummary { stage_id, stage_name: stage.name.clone(), frames: ran, age: preview.age(), events, entities })
}
