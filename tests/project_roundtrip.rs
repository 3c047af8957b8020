use serde_json::json;
use shmup_forge::model::{EntityBody, EntityKind, Point, Project, StageEnemyData};
use shmup_forge::store::ObjectStore;
use tempfile::tempdir;

#[test]
fn objects_serialize_with_type_tag_and_camel_case_fields() {
    let mut store = ObjectStore::default();
    store.open_project(Project::default());
    let id = store.create_object(EntityKind::BossForm).expect("create form");
    let project = store.project().expect("project");

    let value = serde_json::to_value(project.as_ref()).expect("serialize project");
    assert_eq!(value["settings"]["name"], "Untitled");
    assert_eq!(value["settings"]["stageSize"], json!({"x": 384.0, "y": 448.0}));
    let form = &value["objects"][0];
    assert_eq!(form["id"], id);
    assert_eq!(form["type"], "bossForm");
    assert_eq!(form["name"], "New Form 0");
    assert_eq!(form["spriteId"], -1);
    assert_eq!(form["hp"], 100);
}

#[test]
fn missing_fields_take_defaults() {
    let project: Project = serde_json::from_value(json!({
        "objects": [
            {"id": 3, "name": "Grunt", "type": "enemy", "scriptId": 8},
            {"id": 8, "name": "zigzag", "type": "script", "path": "zigzag.rhai"}
        ]
    }))
    .expect("parse project");

    assert_eq!(project.settings().name, "Untitled");
    let grunt = project.get(3).expect("grunt");
    match &grunt.body {
        EntityBody::Enemy(enemy) => {
            assert_eq!(enemy.script_id, 8);
            assert_eq!(enemy.hp, 5);
            assert_eq!(enemy.sprite_id, -1);
        }
        other => panic!("expected enemy, got {other:?}"),
    }
    assert_eq!(project.get(8).and_then(|e| e.as_script()).map(|s| s.path.as_str()), Some("zigzag.rhai"));
}

#[test]
fn save_and_load_preserve_stage_roster() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("nested").join("game.json");

    let mut store = ObjectStore::default();
    store.open_project(Project::default());
    let stage_id = store.create_object(EntityKind::Stage).expect("create stage");
    let mut stage = store.object_by_id(stage_id).expect("stage").as_ref().clone();
    stage.as_stage_mut().expect("stage body").enemies.push(StageEnemyData {
        id: 4,
        instance_name: "wave-a".to_string(),
        position: Point::new(32.0, -16.0),
        spawn_time: 1.5,
        spawn_rate: 0.25,
        spawn_amount: 6,
        lifetime: 8.0,
    });
    store.update_object(stage_id, stage).expect("update stage");

    let project = store.project().expect("project");
    project.save_to_path(&path).expect("save project");
    let loaded = Project::load_from_path(&path).expect("load project");

    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.get(stage_id), project.get(stage_id));
    let placement = &loaded.get(stage_id).and_then(|e| e.as_stage()).expect("stage").enemies[0];
    assert_eq!(placement.instance_name, "wave-a");
    assert_eq!(placement.spawn_amount, 6);
}

#[test]
fn load_reports_missing_files() {
    let dir = tempdir().expect("temp dir");
    let err = Project::load_from_path(dir.path().join("absent.json")).unwrap_err();
    assert!(err.to_string().contains("Failed to read project file"));
}
