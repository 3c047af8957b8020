use std::fs;

use shmup_forge::config::{PreviewConfig, ScriptConfig};
use shmup_forge::events::{DespawnReason, PreviewEvent};
use shmup_forge::model::{
    EnemyData, Entity, EntityBody, EntityKind, Point, Project, ProjectSettings, ScriptData, StageData,
    StageEnemyData,
};
use shmup_forge::preview::{run_preview, StagePreview};
use shmup_forge::scripts::{FsScriptSource, ScriptRuntime};
use shmup_forge::store::ObjectStore;
use tempfile::{tempdir, TempDir};

const DT: f32 = 0.25;
const STAGE: i64 = 10;

struct Fixture {
    _dir: TempDir,
    store: ObjectStore,
    runtime: ScriptRuntime,
}

fn placement(enemy: i64, spawn_time: f32, spawn_rate: f32, spawn_amount: u32, lifetime: f32) -> StageEnemyData {
    StageEnemyData {
        id: enemy,
        instance_name: format!("wave-{enemy}"),
        position: Point::new(50.0, 0.0),
        spawn_time,
        spawn_rate,
        spawn_amount,
        lifetime,
    }
}

/// Enemy 1 drifts down via `drift.rhai`, enemy 2 dies on its first update, enemy 3 has no script,
/// enemy 4 points at a script whose file is missing.
fn fixture(enemies: Vec<StageEnemyData>) -> Fixture {
    let dir = tempdir().expect("temp dir");
    fs::write(
        dir.path().join("drift.rhai"),
        "fn update(ctx) {\n\
         \x20   let p = ctx.entity.position;\n\
         \x20   #{ position: #{ x: p.x, y: p.y + 4 }, fire: ctx.entity.index == 0 }\n\
         }\n",
    )
    .expect("write drift");
    fs::write(dir.path().join("kamikaze.rhai"), "fn update(ctx) { #{ alive: false } }").expect("write kamikaze");

    let script = |id: i64, path: &str| {
        Entity::new(id, format!("s{id}"), EntityBody::Script(ScriptData { path: path.into() }))
    };
    let enemy = |id: i64, script_id: i64| {
        Entity::new(id, format!("e{id}"), EntityBody::Enemy(EnemyData { script_id, ..Default::default() }))
    };
    let project = Project::from_entities(
        ProjectSettings::default(),
        [
            enemy(1, 20),
            enemy(2, 21),
            enemy(3, -1),
            enemy(4, 22),
            script(20, "drift.rhai"),
            script(21, "kamikaze.rhai"),
            script(22, "gone.rhai"),
            Entity::new(
                STAGE,
                "Stage 1",
                EntityBody::Stage(StageData { length_seconds: 3.0, enemies, ..Default::default() }),
            ),
        ],
    );

    let mut store = ObjectStore::default();
    store.open_project(project);
    let mut runtime = ScriptRuntime::with_source(&ScriptConfig::default(), FsScriptSource::rooted(dir.path()));
    runtime.refresh_cache(&store.project().expect("project"));
    Fixture { _dir: dir, store, runtime }
}

#[test]
fn groups_spawn_on_schedule() {
    let Fixture { store, mut runtime, .. } = fixture(vec![placement(3, 0.5, 0.5, 3, -1.0)]);
    let mut preview = StagePreview::new(STAGE);

    preview.step(&store, &mut runtime, DT);
    assert!(preview.entities().is_empty());
    preview.step(&store, &mut runtime, DT);
    assert_eq!(preview.entities().len(), 1);
    for _ in 0..4 {
        preview.step(&store, &mut runtime, DT);
    }
    assert_eq!(preview.entities().len(), 3);
    let indices: Vec<u32> = preview.entities().iter().map(|e| e.index).collect();
    assert_eq!(indices, [0, 1, 2]);
    let spawned = preview.take_events().iter().filter(|e| matches!(e, PreviewEvent::EnemySpawned { .. })).count();
    assert_eq!(spawned, 3);
    for _ in 0..20 {
        preview.step(&store, &mut runtime, DT);
    }
    assert_eq!(preview.entities().len(), 3, "group never grows past spawn_amount");
}

#[test]
fn scripts_move_and_fire() {
    let Fixture { store, mut runtime, .. } = fixture(vec![placement(1, 0.0, 0.0, 2, -1.0)]);
    let mut preview = StagePreview::new(STAGE);
    preview.step(&store, &mut runtime, DT);
    preview.step(&store, &mut runtime, DT);

    let ys: Vec<f32> = preview.entities().iter().map(|e| e.position.y).collect();
    assert_eq!(ys, [8.0, 8.0]);
    let fired: Vec<u32> = preview
        .take_events()
        .iter()
        .filter_map(|e| match e {
            PreviewEvent::EnemyFired { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(fired, [0, 0], "only the first of the group fires");
}

#[test]
fn dead_and_expired_enemies_despawn() {
    let Fixture { store, mut runtime, .. } =
        fixture(vec![placement(2, 0.0, 0.0, 1, -1.0), placement(3, 0.0, 0.0, 1, 0.5)]);
    let mut preview = StagePreview::new(STAGE);
    preview.step(&store, &mut runtime, DT);
    assert_eq!(preview.entities().len(), 1, "kamikaze dies on its first update");
    preview.step(&store, &mut runtime, DT);
    preview.step(&store, &mut runtime, DT);
    assert!(preview.entities().is_empty());

    let reasons: Vec<DespawnReason> = preview
        .take_events()
        .iter()
        .filter_map(|e| match e {
            PreviewEvent::EnemyDespawned { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, [DespawnReason::Killed, DespawnReason::Expired]);
}

#[test]
fn missing_scripts_are_reported_once_and_do_not_stop_the_preview() {
    let Fixture { store, mut runtime, .. } =
        fixture(vec![placement(4, 0.0, 0.0, 1, -1.0), placement(99, 0.0, 0.0, 1, -1.0)]);
    let mut preview = StagePreview::new(STAGE);
    for _ in 0..5 {
        preview.step(&store, &mut runtime, DT);
    }
    assert_eq!(preview.entities().len(), 2, "scriptless and dangling enemies stay put");
    let failures = preview
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, PreviewEvent::ScriptFailed { script_id: 22, .. }))
        .count();
    assert_eq!(failures, 1);
}

fn preview_config(frames: u32) -> PreviewConfig {
    // DT is a quarter second.
    PreviewConfig { frame_rate: 4, frames, ..PreviewConfig::default() }
}

#[test]
fn removing_the_stage_freezes_the_preview() {
    let Fixture { mut store, mut runtime, .. } = fixture(vec![placement(3, 0.0, 0.0, 1, -1.0)]);
    let mut preview = StagePreview::new(STAGE);
    preview.step(&store, &mut runtime, DT);
    assert!(!preview.is_finished(&store));
    let before = preview.entities().to_vec();
    preview.take_events();

    store.remove_object(STAGE).expect("remove stage");
    preview.step(&store, &mut runtime, DT);
    assert_eq!(preview.age(), DT);
    assert_eq!(preview.entities(), before.as_slice());
    assert!(preview.take_events().is_empty());
    assert!(preview.is_finished(&store));
}

#[test]
fn huge_groups_spawn_a_bounded_batch_per_frame() {
    let Fixture { store, mut runtime, .. } = fixture(vec![placement(3, 0.0, 0.0, u32::MAX, -1.0)]);
    let mut preview = StagePreview::new(STAGE).with_spawn_limit(16);
    preview.step(&store, &mut runtime, DT);
    assert_eq!(preview.entities().len(), 16);
    preview.step(&store, &mut runtime, DT);
    assert_eq!(preview.entities().len(), 32);
    let indices: Vec<u32> = preview.entities().iter().map(|e| e.index).collect();
    assert_eq!(indices, (0..32).collect::<Vec<u32>>(), "deferred instances keep their order");

    let summary = run_preview(
        &store,
        &mut runtime,
        STAGE,
        &PreviewConfig { max_spawns_per_frame: 8, ..preview_config(3) },
    )
    .expect("preview");
    assert_eq!(summary.entities.len(), 24);
}

#[test]
fn run_preview_stops_at_stage_end() {
    let Fixture { mut store, mut runtime, .. } = fixture(vec![placement(1, 0.0, 1.0, 2, -1.0)]);
    let summary = run_preview(&store, &mut runtime, STAGE, &preview_config(100)).expect("preview");
    assert_eq!(summary.frames, 12);
    assert_eq!(summary.stage_name, "Stage 1");
    assert_eq!(summary.entities.len(), 2);
    assert!(summary.events.iter().any(|line| line.starts_with("EnemySpawned slot=0 index=1")));

    assert!(run_preview(&store, &mut runtime, 1, &preview_config(10)).is_err(), "enemies are not stages");
    let sound = store.create_object(EntityKind::Sound).expect("create sound");
    assert!(run_preview(&store, &mut runtime, sound + 100, &preview_config(10)).is_err());
}
