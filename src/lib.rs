pub mod assets;
pub mod cli;
pub mod config;
pub mod events;
pub mod model;
pub mod preview;
pub mod scripts;
pub mod store;

pub use model::{Entity, EntityBody, EntityKind, ObjectId, Point, Project, ProjectSettings, UNSET_ID};
pub use scripts::{ScriptContext, ScriptError, ScriptResult, ScriptRuntime};
pub use store::{ObjectAction, ObjectStore, StoreError};
