use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, Map, Scope, AST};
use serde::Serialize;
use thiserror::Error;

use crate::config::ScriptConfig;
use crate::model::{ObjectId, Point, Project};

/// Reads script source for a script object's `path`.
pub trait ScriptSource {
    fn read_source(&self, path: &str) -> Result<String>;
}

/// Reads scripts from disk, resolving relative paths against an optional root.
#[derive(Debug, Clone, Default)]
pub struct FsScriptSource {
    root: Option<PathBuf>,
}

impl FsScriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()) }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ScriptSource for FsScriptSource {
    fn read_source(&self, path: &str) -> Result<String> {
        if path.trim().is_empty() {
            return Err(anyhow!("Script object has no source path"));
        }
        let resolved = self.resolve(path);
        fs::read_to_string(&resolved).with_context(|| format!("Reading {}", resolved.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageScriptData {
    pub size: Point,
    /// Seconds since the stage started.
    pub age: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptEntityData {
    pub age: f32,
    pub spawn_position: Point,
    pub position: Point,
    /// Position of the entity within its spawn group.
    pub index: u32,
}

/// Everything a script's `update` sees for one entity on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScriptContext {
    pub stage: StageScriptData,
    pub delta: f32,
    pub entity: ScriptEntityData,
}

/// What a script asks for. Absent fields mean "no change" (and "still alive").
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScriptResult {
    pub position: Option<Point>,
    pub fire: Option<bool>,
    pub alive: Option<bool>,
}

impl ScriptResult {
    pub fn is_alive(&self) -> bool {
        self.alive.unwrap_or(true)
    }

    pub fn fires(&self) -> bool {
        self.fire.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("object has no script attached")]
    Unset,
    #[error("script {0} is not cached; refresh the script cache first")]
    NotCached(ObjectId),
    #[error("script {id} failed: {message}")]
    Runtime { id: ObjectId, message: String },
    #[error("script {id} returned an invalid result: {message}")]
    InvalidResult { id: ObjectId, message: String },
}

/// A script that could not be loaded during the last refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFault {
    pub script_id: ObjectId,
    pub path: String,
    pub message: String,
}

struct CompiledScript {
    ast: AST,
    scope: Scope<'static>,
}

/// Compiles script objects into isolated rhai contexts and runs their per-frame entry point.
pub struct ScriptRuntime {
    engine: Engine,
    source: Box<dyn ScriptSource>,
    cache: HashMap<ObjectId, CompiledScript>,
    faults: Vec<ScriptFault>,
}

impl ScriptRuntime {
    pub fn new(config: &ScriptConfig) -> Self {
        Self::with_source(config, FsScriptSource::new())
    }

    pub fn with_source(config: &ScriptConfig, source: impl ScriptSource + 'static) -> Self {
        Self {
            engine: sandboxed_engine(config),
            source: Box::new(source),
            cache: HashMap::new(),
            faults: Vec::new(),
        }
    }

    /// Drops every compiled script, then loads each `script` object in `project` from scratch.
    /// Scripts that fail to read, compile or initialise are logged and left out of the cache.
    pub fn refresh_cache(&mut self, project: &Project) {
        self.cache.clear();
        self.faults.clear();

        for entity in project.objects() {
            let Some(script) = entity.as_script() else {
                continue;
            };
            match self.load_script(&script.path) {
                Ok(compiled) => {
                    self.cache.insert(entity.id, compiled);
                }
                Err(err) => {
                    log::error!(target: "scripts", "script {} ('{}') failed to load: {err:#}", entity.id, entity.name);
                    self.faults.push(ScriptFault {
                        script_id: entity.id,
                        path: script.path.clone(),
                        message: format!("{err:#}"),
                    });
                }
            }
        }

        log::info!(
            target: "scripts",
            "script cache refreshed: {} compiled, {} faulted",
            self.cache.len(),
            self.faults.len()
        );
    }

    fn load_script(&self, path: &str) -> Result<CompiledScript> {
        let source = self.source.read_source(path)?;
        let ast = self.engine.compile(source).with_context(|| format!("Compiling script {path}"))?;
        let mut scope = Scope::new();
        self.engine
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|err| anyhow!("Running top-level code of {path}: {err}"))?;
        Ok(CompiledScript { ast, scope })
    }

    pub fn is_cached(&self, script_id: ObjectId) -> bool {
        self.cache.contains_key(&script_id)
    }

    pub fn cached_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.cache.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn faults(&self) -> &[ScriptFault] {
        &self.faults
    }

    /// Entry points of a cached script.
    pub fn methods(&mut self, script_id: ObjectId) -> Result<ScriptMethods<'_>, ScriptError> {
        if script_id < 0 {
            return Err(ScriptError::Unset);
        }
        let script = self.cache.get_mut(&script_id).ok_or(ScriptError::NotCached(script_id))?;
        Ok(ScriptMethods { id: script_id, engine: &self.engine, script })
    }
}

pub struct ScriptMethods<'a> {
    id: ObjectId,
    engine: &'a Engine,
    script: &'a mut CompiledScript,
}

impl ScriptMethods<'_> {
    /// Runs the script's `update(ctx)`. A script without `update` leaves the entity unchanged.
    pub fn update(&mut self, context: &ScriptContext) -> Result<ScriptResult, ScriptError> {
        let id = self.id;
        let ctx = rhai::serde::to_dynamic(context)
            .map_err(|err| ScriptError::Runtime { id, message: err.to_string() })?;
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let value = match self.engine.call_fn_with_options::<Dynamic>(
            options,
            &mut self.script.scope,
            &self.script.ast,
            "update",
            (ctx,),
        ) {
            Ok(value) => value,
            Err(err) => match err.as_ref() {
                EvalAltResult::ErrorFunctionNotFound(signature, _) if signature.starts_with("update") => {
                    return Ok(ScriptResult::default());
                }
                _ => return Err(ScriptError::Runtime { id, message: err.to_string() }),
            },
        };
        parse_result(id, value)
    }
}

fn sandboxed_engine(config: &ScriptConfig) -> Engine {
    let mut engine = Engine::new();
    engine.set_fast_operators(true);
    engine.set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");
    engine.set_max_operations(config.max_operations);
    engine.set_max_call_levels(config.max_call_levels);
    engine.set_max_expr_depths(config.max_expr_depth, config.max_expr_depth);
    engine.set_max_string_size(config.max_string_size);
    engine.set_max_array_size(config.max_array_size);
    engine.set_max_map_size(config.max_map_size);
    engine.on_print(|text| log::info!(target: "script", "{text}"));
    engine.on_debug(|text, source, pos| {
        log::debug!(target: "script", "[{}:{pos}] {text}", source.unwrap_or("script"));
    });
    engine
}

fn parse_result(id: ObjectId, value: Dynamic) -> Result<ScriptResult, ScriptError> {
    let invalid = |message: String| ScriptError::InvalidResult { id, message };
    if value.is_unit() {
        return Ok(ScriptResult::default());
    }
    let type_name = value.type_name();
    let map = value.try_cast::<Map>().ok_or_else(|| invalid(format!("expected an object map, got {type_name}")))?;

    let position = match map.get("position") {
        None => None,
        Some(value) if value.is_unit() => None,
        Some(value) => {
            let point = value
                .clone()
                .try_cast::<Map>()
                .ok_or_else(|| invalid(format!("`position` must be a map, got {}", value.type_name())))?;
            let x = number_field(&point, "x").ok_or_else(|| invalid("`position.x` must be a number".into()))?;
            let y = number_field(&point, "y").ok_or_else(|| invalid("`position.y` must be a number".into()))?;
            Some(Point::new(x, y))
        }
    };

    Ok(ScriptResult {
        position,
        fire: bool_field(&map, "fire", &invalid)?,
        alive: bool_field(&map, "alive", &invalid)?,
    })
}

fn number_field(map: &Map, key: &str) -> Option<f32> {
    let value = map.get(key)?;
    value.as_float().map(|v| v as f32).or_else(|_| value.as_int().map(|v| v as f32)).ok()
}

fn bool_field(
    map: &Map,
    key: &str,
    invalid: &dyn Fn(String) -> ScriptError,
) -> Result<Option<bool>, ScriptError> {
    match map.get(key) {
        None => Ok(None),
        Some(value) if value.is_unit() => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .map_err(|actual| invalid(format!("`{key}` must be a boolean, got {actual}"))),
    }
}
