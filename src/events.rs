use glam::Vec2;
use std::fmt;

use crate::model::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DespawnReason {
    /// The script returned `alive: false`.
    Killed,
    /// The placement's lifetime ran out.
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewEvent {
    EnemySpawned { slot: usize, index: u32, enemy_id: ObjectId, position: Vec2 },
    EnemyFired { slot: usize, index: u32, position: Vec2 },
    EnemyDespawned { slot: usize, index: u32, reason: DespawnReason },
    ScriptFailed { script_id: ObjectId, message: String },
}

impl fmt::Display for PreviewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreviewEvent::EnemySpawned { slot, index, enemy_id, position } => {
                write!(
                    f,
                    "EnemySpawned slot={slot} index={index} enemy={enemy_id} at=({:.1}, {:.1})",
                    position.x, position.y
                )
            }
            PreviewEvent::EnemyFired { slot, index, position } => {
                write!(f, "EnemyFired slot={slot} index={index} at=({:.1}, {:.1})", position.x, position.y)
            }
            PreviewEvent::EnemyDespawned { slot, index, reason } => {
                write!(f, "EnemyDespawned slot={slot} index={index} reason={reason:?}")
            }
            PreviewEvent::ScriptFailed { script_id, message } => {
                write!(f, "ScriptFailed script={script_id} {message}")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    events: Vec<PreviewEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: PreviewEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<PreviewEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
