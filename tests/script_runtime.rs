use std::fs;
use std::path::Path;

use shmup_forge::config::ScriptConfig;
use shmup_forge::model::{Entity, EntityBody, Point, Project, ProjectSettings, ScriptData};
use shmup_forge::scripts::{
    FsScriptSource, ScriptContext, ScriptEntityData, ScriptError, ScriptRuntime, StageScriptData,
};
use tempfile::{tempdir, TempDir};

fn script_entity(id: i64, path: &str) -> Entity {
    Entity::new(id, format!("script {id}"), EntityBody::Script(ScriptData { path: path.to_string() }))
}

fn write_scripts(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().expect("temp dir");
    for (name, source) in files {
        fs::write(dir.path().join(name), source).expect("write script");
    }
    dir
}

fn runtime_for(root: &Path, config: &ScriptConfig, project: &Project) -> ScriptRuntime {
    let mut runtime = ScriptRuntime::with_source(config, FsScriptSource::rooted(root));
    runtime.refresh_cache(project);
    runtime
}

fn context() -> ScriptContext {
    ScriptContext {
        stage: StageScriptData { size: Point::new(384.0, 448.0), age: 0.0 },
        delta: 1.0 / 60.0,
        entity: ScriptEntityData {
            age: 0.0,
            spawn_position: Point::new(100.0, 0.0),
            position: Point::new(100.0, 0.0),
            index: 0,
        },
    }
}

#[test]
fn each_script_compiles_into_its_own_context() {
    let dir = write_scripts(&[
        (
            "down.rhai",
            "fn speed() { 60.0 }\n\
             fn update(ctx) { let p = ctx.entity.position; #{ position: #{ x: p.x, y: p.y + speed() } } }",
        ),
        (
            "left.rhai",
            "fn speed() { 30.0 }\n\
             fn update(ctx) { let p = ctx.entity.position; #{ position: #{ x: p.x - speed(), y: p.y } } }",
        ),
    ]);
    let project = Project::from_entities(
        ProjectSettings::default(),
        [script_entity(0, "down.rhai"), script_entity(1, "left.rhai")],
    );
    let mut runtime = runtime_for(dir.path(), &ScriptConfig::default(), &project);
    assert_eq!(runtime.cached_ids(), [0, 1]);
    assert!(runtime.faults().is_empty());

    let down = runtime.methods(0).expect("script 0").update(&context()).expect("update 0");
    let left = runtime.methods(1).expect("script 1").update(&context()).expect("update 1");
    assert_eq!(down.position, Some(Point::new(100.0, 60.0)));
    assert_eq!(left.position, Some(Point::new(70.0, 0.0)));
}

#[test]
fn unreadable_and_broken_scripts_become_faults() {
    let dir = write_scripts(&[("broken.rhai", "fn update(ctx) { #{ position: "), ("ok.rhai", "fn update(ctx) { }")]);
    let project = Project::from_entities(
        ProjectSettings::default(),
        [
            script_entity(0, "missing.rhai"),
            script_entity(1, "broken.rhai"),
            script_entity(2, "ok.rhai"),
            script_entity(3, ""),
        ],
    );
    let mut runtime = runtime_for(dir.path(), &ScriptConfig::default(), &project);

    assert_eq!(runtime.cached_ids(), [2]);
    let faulted: Vec<i64> = runtime.faults().iter().map(|fault| fault.script_id).collect();
    assert_eq!(faulted, [0, 1, 3]);
    assert!(runtime.faults()[0].message.contains("missing.rhai"));
    assert!(matches!(runtime.methods(1), Err(ScriptError::NotCached(1))));
}

#[test]
fn runaway_scripts_hit_the_operation_limit() {
    let dir = write_scripts(&[("spin.rhai", "fn update(ctx) { loop { } }")]);
    let project = Project::from_entities(ProjectSettings::default(), [script_entity(5, "spin.rhai")]);
    let config = ScriptConfig { max_operations: 1_000, ..ScriptConfig::default() };
    let mut runtime = runtime_for(dir.path(), &config, &project);

    let err = runtime.methods(5).expect("cached").update(&context()).unwrap_err();
    assert!(matches!(err, ScriptError::Runtime { id: 5, .. }), "{err:?}");
}

#[test]
fn sandbox_blocks_imports_and_eval() {
    let dir = write_scripts(&[
        ("import.rhai", "import \"helpers\" as h;\nfn update(ctx) { }"),
        ("eval.rhai", "fn update(ctx) { eval(\"40 + 2\") }"),
    ]);
    let project = Project::from_entities(
        ProjectSettings::default(),
        [script_entity(0, "import.rhai"), script_entity(1, "eval.rhai")],
    );
    let runtime = runtime_for(dir.path(), &ScriptConfig::default(), &project);
    assert!(runtime.cached_ids().is_empty(), "cached: {:?}", runtime.cached_ids());
    assert_eq!(runtime.faults().len(), 2);
}

#[test]
fn refresh_picks_up_edited_sources() {
    let dir = write_scripts(&[("fire.rhai", "fn update(ctx) { #{ fire: false } }")]);
    let project = Project::from_entities(ProjectSettings::default(), [script_entity(0, "fire.rhai")]);
    let mut runtime = runtime_for(dir.path(), &ScriptConfig::default(), &project);
    assert!(!runtime.methods(0).expect("cached").update(&context()).expect("update").fires());

    fs::write(dir.path().join("fire.rhai"), "fn update(ctx) { #{ fire: true } }").expect("rewrite script");
    assert!(!runtime.methods(0).expect("cached").update(&context()).expect("update").fires(), "cache is sticky");
    runtime.refresh_cache(&project);
    assert!(runtime.methods(0).expect("cached").update(&context()).expect("update").fires());

    runtime.refresh_cache(&Project::default());
    assert!(!runtime.is_cached(0));
}
