use std::fs::{self, File};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use shmup_forge::cli::{PreviewArgs, StageSelector};
use shmup_forge::config::StudioConfig;
use shmup_forge::model::{EntityKind, ObjectId, Project};
use shmup_forge::preview::run_preview;
use shmup_forge::scripts::{FsScriptSource, ScriptRuntime};
use shmup_forge::store::ObjectStore;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run_cli() {
        eprintln!("[stage-preview] error: {err:?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = PreviewArgs::parse_from_env()?;
    if args.help {
        println!("{}", PreviewArgs::usage());
        return Ok(());
    }
    let project_path = args.project.clone().ok_or_else(|| anyhow!("--project is required"))?;
    let selector = args.stage.clone().ok_or_else(|| anyhow!("--stage is required"))?;

    let mut config = match &args.config {
        Some(path) => StudioConfig::load(path)?,
        None => StudioConfig::default(),
    };
    config.apply_overrides(&args.config_overrides());

    let project = Project::load_from_path(&project_path)?;
    let mut store = ObjectStore::new(&config.history);
    store.open_project(project);
    for error in store.errors() {
        log::warn!(target: "store", "{error}");
    }

    let stage_id = resolve_stage(&store, &selector)?;
    let script_root = project_path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut runtime = ScriptRuntime::with_source(&config.scripts, FsScriptSource::rooted(script_root));
    let snapshot = store.project().ok_or_else(|| anyhow!("project was not opened"))?;
    runtime.refresh_cache(&snapshot);

    let summary = run_preview(&store, &mut runtime, stage_id, &config.preview)?;

    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating output directory '{}'", parent.display()))?;
                }
            }
            let file =
                File::create(path).with_context(|| format!("writing preview report to '{}'", path.display()))?;
            serde_json::to_writer_pretty(file, &summary).with_context(|| "serializing preview report")?;
            println!("[stage-preview] wrote {}", path.display());
        }
        None => {
            serde_json::to_writer_pretty(std::io::stdout(), &summary)?;
            println!();
        }
    }
    Ok(())
}

fn resolve_stage(store: &ObjectStore, selector: &StageSelector) -> Result<ObjectId> {
    let entity = match selector {
        StageSelector::Id(id) => store.object_by_id(*id).ok_or_else(|| anyhow!("no object with id {id}"))?,
        StageSelector::Name(name) => {
            store.object_by_name(name).ok_or_else(|| anyhow!("no object named '{name}'"))?
        }
    };
    if entity.kind() != EntityKind::Stage {
        bail!("'{}' is a {}, not a stage", entity.name, entity.kind());
    }
    Ok(entity.id)
}
