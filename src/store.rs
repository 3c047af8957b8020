pub mod history;
pub mod path;
pub mod subscriptions;
pub mod validation;

use std::sync::Arc;

use thiserror::Error;

use crate::config::HistoryConfig;
use crate::model::{Entity, EntityBody, EntityKind, ObjectId, Project, ProjectSettings};

pub use history::{History, DEFAULT_MAX_HISTORY};
pub use path::{PathError, PathStep, SubObjectPath};
pub use subscriptions::{Channel, ListenerId, ObjectAction, Subscriptions};
pub use validation::validate;

/// Exclusive upper bound of allocatable object ids.
pub const MAX_OBJECT_IDS: ObjectId = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no project is loaded")]
    NoProject,
    #[error("object with id {0} does not exist")]
    ObjectNotFound(ObjectId),
    #[error("all {0} object ids are in use")]
    IdSpaceExhausted(ObjectId),
    #[error("listener {listener} is not subscribed to the {channel} channel")]
    NotSubscribed { channel: Channel, listener: ListenerId },
}

/// Starting point for [`ObjectStore::resolve_sub_object`].
#[derive(Debug, Clone, Copy)]
pub enum SubObjectRoot<'a> {
    Id(ObjectId),
    Entity(&'a Entity),
}

impl From<ObjectId> for SubObjectRoot<'_> {
    fn from(id: ObjectId) -> Self {
        SubObjectRoot::Id(id)
    }
}

impl<'a> From<&'a Entity> for SubObjectRoot<'a> {
    fn from(entity: &'a Entity) -> Self {
        SubObjectRoot::Entity(entity)
    }
}

impl<'a> From<&'a Arc<Entity>> for SubObjectRoot<'a> {
    fn from(entity: &'a Arc<Entity>) -> Self {
        SubObjectRoot::Entity(entity.as_ref())
    }
}

/// Owns the active project, its undo history, the validation results and all listeners.
///
/// Every mutation publishes a fresh `Arc<Project>`; snapshots handed out earlier never change.
#[derive(Debug)]
pub struct ObjectStore {
    history: History,
    errors: Vec<String>,
    subscriptions: Subscriptions,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::with_max_history(DEFAULT_MAX_HISTORY)
    }
}

impl ObjectStore {
    pub fn new(config: &HistoryConfig) -> Self {
        Self::with_max_history(config.max_size)
    }

    pub fn with_max_history(max_size: usize) -> Self {
        Self { history: History::new(max_size), errors: Vec::new(), subscriptions: Subscriptions::new() }
    }

    pub fn project(&self) -> Option<Arc<Project>> {
        self.history.current().cloned()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn subscriptions(&mut self) -> &mut Subscriptions {
        &mut self.subscriptions
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_cursor(&self) -> Option<usize> {
        self.history.cursor()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Replaces the active project. `None` closes it and wipes the history.
    pub fn set_project(&mut self, project: Option<Arc<Project>>) {
        let old = self.project();
        match project {
            None => {
                self.history.clear();
                self.errors.clear();
                log::debug!(target: "store", "project closed");
                self.subscriptions.broadcast_project(None, old.as_ref());
            }
            Some(project) => {
                self.push_snapshot(project.clone());
                self.subscriptions.broadcast_project(Some(&project), old.as_ref());
                self.subscriptions.broadcast_diff(old.as_ref(), &project);
            }
        }
    }

    pub fn open_project(&mut self, project: Project) {
        self.set_project(Some(Arc::new(project)));
    }

    pub fn close_project(&mut self) {
        self.set_project(None);
    }

    /// Steps back one snapshot. Returns `false` when already at the oldest entry.
    pub fn undo(&mut self) -> bool {
        match self.history.step_back() {
            Some(left) => {
                self.broadcast_navigation(left);
                true
            }
            None => false,
        }
    }

    /// Steps forward one snapshot. Returns `false` when already at the newest entry.
    pub fn redo(&mut self) -> bool {
        match self.history.step_forward() {
            Some(left) => {
                self.broadcast_navigation(left);
                true
            }
            None => false,
        }
    }

    pub fn update_settings(&mut self, settings: ProjectSettings) -> Result<(), StoreError> {
        let project = self.require_project()?;
        let settings = Arc::new(settings);
        self.commit(Arc::new(project.with_settings(settings.clone())));
        self.subscriptions.broadcast_settings(&settings);
        Ok(())
    }

    /// Adds a default-initialised object of `kind` and returns its id.
    pub fn create_object(&mut self, kind: EntityKind) -> Result<ObjectId, StoreError> {
        let project = self.require_project()?;
        let id = allocate_id(&project)?;
        let ordinal = project.objects().filter(|entity| entity.kind() == kind).count();
        let entity = Arc::new(Entity::new(
            id,
            format!("New {} {}", kind.label(), ordinal),
            EntityBody::default_for(kind),
        ));

        self.commit(Arc::new(project.with_pushed(entity.clone())));
        log::debug!(target: "store", "created {kind} object {id}");
        self.subscriptions.broadcast_object(id, Some(&entity), None, ObjectAction::Create);
        Ok(id)
    }

    /// Replaces the object with `id`, keeping its position. The new value always carries `id`.
    pub fn update_object(&mut self, id: ObjectId, entity: impl Into<Arc<Entity>>) -> Result<(), StoreError> {
        let project = self.require_project()?;
        let index = project.index_of(id).ok_or(StoreError::ObjectNotFound(id))?;
        let previous = project.at(index).cloned();
        let mut entity = entity.into();
        if entity.id != id {
            Arc::make_mut(&mut entity).id = id;
        }

        self.commit(Arc::new(project.with_replaced(index, entity.clone())));
        self.subscriptions.broadcast_object(id, Some(&entity), previous.as_ref(), ObjectAction::Update);
        Ok(())
    }

    pub fn remove_object(&mut self, id: ObjectId) -> Result<(), StoreError> {
        let project = self.require_project()?;
        let index = project.index_of(id).ok_or(StoreError::ObjectNotFound(id))?;
        let previous = project.at(index).cloned();

        self.commit(Arc::new(project.with_removed(index)));
        log::debug!(target: "store", "removed object {id}");
        self.subscriptions.broadcast_object(id, None, previous.as_ref(), ObjectAction::Delete);
        Ok(())
    }

    /// `None` for negative ids, unknown ids, or when no project is loaded.
    pub fn object_by_id(&self, id: ObjectId) -> Option<Arc<Entity>> {
        self.history.current().and_then(|project| project.get(id)).cloned()
    }

    pub fn object_by_name(&self, name: &str) -> Option<Arc<Entity>> {
        if name.is_empty() {
            return None;
        }
        self.history.current()?.objects().find(|entity| entity.name == name).cloned()
    }

    pub fn objects_of_type(&self, kind: EntityKind) -> Vec<Arc<Entity>> {
        match self.history.current() {
            Some(project) => project.objects().filter(|entity| entity.kind() == kind).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Follows `path` from `root` through foreign-id fields. Any missing field, index or object
    /// along the way yields `None`.
    pub fn resolve_sub_object<'a>(
        &self,
        root: impl Into<SubObjectRoot<'a>>,
        path: &SubObjectPath,
    ) -> Option<Arc<Entity>> {
        let project = self.history.current()?;
        let mut current: &Entity = match root.into() {
            SubObjectRoot::Id(id) => project.get(id)?.as_ref(),
            SubObjectRoot::Entity(entity) => entity,
        };
        let mut resolved: Option<&Arc<Entity>> = None;

        for step in path.steps() {
            let next_id = match step {
                PathStep::Field { key } => current.reference(key)?,
                PathStep::Indexed { key, index } => *current.reference_list(key)?.get(*index)?,
            };
            let next = project.get(next_id)?;
            current = next.as_ref();
            resolved = Some(next);
        }

        resolved.cloned()
    }

    /// Parses `path` and resolves it. Malformed paths are an error, unresolved ones are `Ok(None)`.
    pub fn resolve_sub_object_str<'a>(
        &self,
        root: impl Into<SubObjectRoot<'a>>,
        path: &str,
    ) -> Result<Option<Arc<Entity>>, PathError> {
        let path = SubObjectPath::parse(path)?;
        Ok(self.resolve_sub_object(root, &path))
    }

    fn require_project(&self) -> Result<Arc<Project>, StoreError> {
        self.project().ok_or(StoreError::NoProject)
    }

    fn push_snapshot(&mut self, project: Arc<Project>) {
        let evicted = self.history.push(project.clone());
        if evicted > 0 {
            log::debug!(target: "store", "history full, evicted {evicted} oldest snapshot(s)");
        }
        self.revalidate(&project);
    }

    /// Publishes a store-built snapshot; object notifications are left to the caller.
    fn commit(&mut self, project: Arc<Project>) {
        let old = self.project();
        self.push_snapshot(project.clone());
        self.subscriptions.broadcast_project(Some(&project), old.as_ref());
    }

    fn revalidate(&mut self, project: &Project) {
        self.errors = validate(project);
        self.subscriptions.broadcast_errors(&self.errors);
    }

    fn broadcast_navigation(&mut self, left: Arc<Project>) {
        let Some(head) = self.project() else {
            return;
        };
        self.revalidate(&head);
        self.subscriptions.broadcast_project(Some(&head), Some(&left));
        self.subscriptions.broadcast_diff(Some(&left), &head);
    }
}

fn allocate_id(project: &Project) -> Result<ObjectId, StoreError> {
    (0..MAX_OBJECT_IDS).find(|id| !project.contains(*id)).ok_or(StoreError::IdSpaceExhausted(MAX_OBJECT_IDS))
}
