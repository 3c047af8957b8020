use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::model::{Entity, ObjectId, Project, ProjectSettings};

use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectAction {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ObjectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectAction::Create => f.write_str("create"),
            ObjectAction::Update => f.write_str("update"),
            ObjectAction::Delete => f.write_str("delete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Project,
    Settings,
    Errors,
    Object(ObjectId),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Project => f.write_str("project"),
            Channel::Settings => f.write_str("settings"),
            Channel::Errors => f.write_str("errors"),
            Channel::Object(id) => write!(f, "object {id}"),
        }
    }
}

pub type ProjectListener = Box<dyn FnMut(Option<&Arc<Project>>, Option<&Arc<Project>>)>;
pub type SettingsListener = Box<dyn FnMut(&Arc<ProjectSettings>)>;
pub type ErrorListener = Box<dyn FnMut(&[String])>;
pub type ObjectListener = Box<dyn FnMut(ObjectId, Option<&Arc<Entity>>, Option<&Arc<Entity>>, ObjectAction)>;

struct Listeners<F> {
    entries: Vec<(ListenerId, F)>,
}

impl<F> Default for Listeners<F> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<F> Listeners<F> {
    fn push(&mut self, id: ListenerId, listener: F) {
        self.entries.push((id, listener));
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        match self.entries.iter().position(|(existing, _)| *existing == id) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut F> {
        self.entries.iter_mut().map(|(_, listener)| listener)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Change-notification fan-out for the object store. Listeners run inline, in registration order.
#[derive(Default)]
pub struct Subscriptions {
    next_id: u64,
    project: Listeners<ProjectListener>,
    settings: Listeners<SettingsListener>,
    errors: Listeners<ErrorListener>,
    objects: HashMap<ObjectId, Listeners<ObjectListener>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn subscribe_project(
        &mut self,
        listener: impl FnMut(Option<&Arc<Project>>, Option<&Arc<Project>>) + 'static,
    ) -> ListenerId {
        let id = self.allocate();
        self.project.push(id, Box::new(listener));
        id
    }

    pub fn unsubscribe_project(&mut self, id: ListenerId) -> Result<(), StoreError> {
        if self.project.remove(id) {
            Ok(())
        } else {
            Err(StoreError::NotSubscribed { channel: Channel::Project, listener: id })
        }
    }

    pub fn subscribe_settings(&mut self, listener: impl FnMut(&Arc<ProjectSettings>) + 'static) -> ListenerId {
        let id = self.allocate();
        self.settings.push(id, Box::new(listener));
        id
    }

    pub fn unsubscribe_settings(&mut self, id: ListenerId) -> Result<(), StoreError> {
        if self.settings.remove(id) {
            Ok(())
        } else {
            Err(StoreError::NotSubscribed { channel: Channel::Settings, listener: id })
        }
    }

    pub fn subscribe_errors(&mut self, listener: impl FnMut(&[String]) + 'static) -> ListenerId {
        let id = self.allocate();
        self.errors.push(id, Box::new(listener));
        id
    }

    pub fn unsubscribe_errors(&mut self, id: ListenerId) -> Result<(), StoreError> {
        if self.errors.remove(id) {
            Ok(())
        } else {
            Err(StoreError::NotSubscribed { channel: Channel::Errors, listener: id })
        }
    }

    pub fn subscribe_object(
        &mut self,
        object: ObjectId,
        listener: impl FnMut(ObjectId, Option<&Arc<Entity>>, Option<&Arc<Entity>>, ObjectAction) + 'static,
    ) -> ListenerId {
        let id = self.allocate();
        self.objects.entry(object).or_default().push(id, Box::new(listener));
        id
    }

    pub fn unsubscribe_object(&mut self, object: ObjectId, id: ListenerId) -> Result<(), StoreError> {
        let listeners = self.objects.entry(object).or_default();
        let removed = listeners.remove(id);
        if listeners.is_empty() {
            self.objects.remove(&object);
        }
        if removed {
            Ok(())
        } else {
            Err(StoreError::NotSubscribed { channel: Channel::Object(object), listener: id })
        }
    }

    pub fn listener_count(&self, channel: Channel) -> usize {
        match channel {
            Channel::Project => self.project.len(),
            Channel::Settings => self.settings.len(),
            Channel::Errors => self.errors.len(),
            Channel::Object(id) => self.objects.get(&id).map_or(0, Listeners::len),
        }
    }

    pub fn broadcast_project(&mut self, project: Option<&Arc<Project>>, old: Option<&Arc<Project>>) {
        for listener in self.project.iter_mut() {
            listener(project, old);
        }
    }

    pub fn broadcast_settings(&mut self, settings: &Arc<ProjectSettings>) {
        for listener in self.settings.iter_mut() {
            listener(settings);
        }
    }

    pub fn broadcast_errors(&mut self, errors: &[String]) {
        for listener in self.errors.iter_mut() {
            listener(errors);
        }
    }

    pub fn broadcast_object(
        &mut self,
        id: ObjectId,
        entity: Option<&Arc<Entity>>,
        previous: Option<&Arc<Entity>>,
        action: ObjectAction,
    ) {
        if let Some(listeners) = self.objects.get_mut(&id) {
            for listener in listeners.iter_mut() {
                listener(id, entity, previous, action);
            }
        }
    }

    /// Settings and per-object notifications for a move from `old` to `new`. Objects whose
    /// entry changed (or first appeared) get `Update`, objects that vanished get `Delete`.
    pub fn broadcast_diff(&mut self, old: Option<&Arc<Project>>, new: &Arc<Project>) {
        let settings_changed = old.map_or(true, |old| !Arc::ptr_eq(old.settings(), new.settings()));
        if settings_changed {
            self.broadcast_settings(new.settings());
        }

        for entity in new.objects() {
            let previous = old.and_then(|old| old.get(entity.id));
            let unchanged = previous.is_some_and(|previous| Arc::ptr_eq(previous, entity));
            if !unchanged {
                self.broadcast_object(entity.id, Some(entity), previous, ObjectAction::Update);
            }
        }

        if let Some(old) = old {
            for entity in old.objects() {
                if !new.contains(entity.id) {
                    self.broadcast_object(entity.id, None, Some(entity), ObjectAction::Delete);
                }
            }
        }
    }
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("project", &self.project.len())
            .field("settings", &self.settings.len())
            .field("errors", &self.errors.len())
            .field("objects", &self.objects.len())
            .finish()
    }
}
