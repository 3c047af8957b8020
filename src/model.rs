use anyhow::{Context, Result};
use glam::Vec2;
use im::{HashMap as ImHashMap, Vector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Numeric object id. Stored references use [`UNSET_ID`] for "no reference".
pub type ObjectId = i64;

pub const UNSET_ID: ObjectId = -1;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<Vec2> for Point {
    fn from(value: Vec2) -> Self {
        Self { x: value.x, y: value.y }
    }
}

impl From<Point> for Vec2 {
    fn from(value: Point) -> Self {
        Vec2::new(value.x, value.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Sprite,
    Sound,
    Player,
    Script,
    Enemy,
    Bullet,
    Boss,
    BossForm,
    Stage,
    Background,
    Consumable,
}

impl EntityKind {
    pub const ALL: [EntityKind; 11] = [
        EntityKind::Sprite,
        EntityKind::Sound,
        EntityKind::Player,
        EntityKind::Script,
        EntityKind::Enemy,
        EntityKind::Bullet,
        EntityKind::Boss,
        EntityKind::BossForm,
        EntityKind::Stage,
        EntityKind::Background,
        EntityKind::Consumable,
    ];

    /// Serialized discriminant, also used in validation messages.
    pub fn tag(self) -> &'static str {
        match self {
            EntityKind::Sprite => "sprite",
            EntityKind::Sound => "sound",
            EntityKind::Player => "player",
            EntityKind::Script => "script",
            EntityKind::Enemy => "enemy",
            EntityKind::Bullet => "bullet",
            EntityKind::Boss => "boss",
            EntityKind::BossForm => "bossForm",
            EntityKind::Stage => "stage",
            EntityKind::Background => "background",
            EntityKind::Consumable => "consumable",
        }
    }

    /// Label used when naming freshly created objects.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Sprite => "Sprite",
            EntityKind::Sound => "Sound",
            EntityKind::Player => "Player",
            EntityKind::Script => "Script",
            EntityKind::Enemy => "Enemy",
            EntityKind::Bullet => "Bullet",
            EntityKind::Boss => "Boss",
            EntityKind::BossForm => "Form",
            EntityKind::Stage => "Stage",
            EntityKind::Background => "Background",
            EntityKind::Consumable => "Consumable",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hitbox {
    pub position: Point,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpriteData {
    pub path: String,
    pub hitboxes: Vec<Hitbox>,
    pub num_cells: u32,
    pub frames_per_cell: u32,
}

impl Default for SpriteData {
    fn default() -> Self {
        Self { path: String::new(), hitboxes: Vec::new(), num_cells: 1, frames_per_cell: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundData {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptData {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundData {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerData {
    pub move_speed: f32,
    pub focused_move_speed: f32,
    pub lives: u32,
    pub script_id: ObjectId,
    pub sprite_id: ObjectId,
    pub bullet_id: ObjectId,
}

impl Default for PlayerData {
    fn default() -> Self {
        Self {
            move_speed: 400.0,
            focused_move_speed: 200.0,
            lives: 3,
            script_id: UNSET_ID,
            sprite_id: UNSET_ID,
            bullet_id: UNSET_ID,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnemyData {
    pub hp: u32,
    pub bullet_id: ObjectId,
    pub script_id: ObjectId,
    pub sprite_id: ObjectId,
}

impl Default for EnemyData {
    fn default() -> Self {
        Self { hp: 5, bullet_id: UNSET_ID, script_id: UNSET_ID, sprite_id: UNSET_ID }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BulletData {
    pub damage: u32,
    pub fire_rate: f32,
    pub script_id: ObjectId,
    pub sprite_id: ObjectId,
}

impl Default for BulletData {
    fn default() -> Self {
        Self { damage: 1, fire_rate: 1.0, script_id: UNSET_ID, sprite_id: UNSET_ID }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BossData {
    pub form_ids: Vec<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BossFormData {
    pub hp: u32,
    /// Frames the form stays active.
    pub lifetime: u32,
    pub bullet_id: ObjectId,
    pub script_id: ObjectId,
    pub sprite_id: ObjectId,
}

impl Default for BossFormData {
    fn default() -> Self {
        Self { hp: 100, lifetime: 60 * 30, bullet_id: UNSET_ID, script_id: UNSET_ID, sprite_id: UNSET_ID }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsumableData {
    pub script_id: ObjectId,
    pub sprite_id: ObjectId,
}

impl Default for ConsumableData {
    fn default() -> Self {
        Self { script_id: UNSET_ID, sprite_id: UNSET_ID }
    }
}

/// One placement of an enemy definition inside a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StageEnemyData {
    /// Id of the `enemy` object this placement instantiates.
    pub id: ObjectId,
    pub instance_name: String,
    pub position: Point,
    /// Seconds into the stage when the first instance appears.
    pub spawn_time: f32,
    /// Seconds between consecutive instances of the group.
    pub spawn_rate: f32,
    pub spawn_amount: u32,
    /// Seconds each instance lives; negative means until the script kills it.
    pub lifetime: f32,
}

impl Default for StageEnemyData {
    fn default() -> Self {
        Self {
            id: UNSET_ID,
            instance_name: String::new(),
            position: Point::default(),
            spawn_time: 0.0,
            spawn_rate: 0.0,
            spawn_amount: 1,
            lifetime: -1.0,
        }
    }
}

pub const DEFAULT_STAGE_SIZE: Point = Point::new(384.0, 448.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StageData {
    pub background_id: ObjectId,
    pub music_id: ObjectId,
    pub boss_id: ObjectId,
    pub player_id: ObjectId,
    pub length_seconds: f32,
    pub size: Point,
    pub enemies: Vec<StageEnemyData>,
    pub player_spawn_position: Point,
    pub boss_spawn_position: Point,
}

impl Default for StageData {
    fn default() -> Self {
        Self {
            background_id: UNSET_ID,
            music_id: UNSET_ID,
            boss_id: UNSET_ID,
            player_id: UNSET_ID,
            length_seconds: 60.0,
            size: DEFAULT_STAGE_SIZE,
            enemies: Vec::new(),
            player_spawn_position: Point::new(DEFAULT_STAGE_SIZE.x / 2.0, 400.0),
            boss_spawn_position: Point::new(DEFAULT_STAGE_SIZE.x / 2.0, 100.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EntityBody {
    Sprite(SpriteData),
    Sound(SoundData),
    Player(PlayerData),
    Script(ScriptData),
    Enemy(EnemyData),
    Bullet(BulletData),
    Boss(BossData),
    BossForm(BossFormData),
    Stage(StageData),
    Background(BackgroundData),
    Consumable(ConsumableData),
}

impl EntityBody {
    pub fn default_for(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Sprite => EntityBody::Sprite(SpriteData::default()),
            EntityKind::Sound => EntityBody::Sound(SoundData::default()),
            EntityKind::Player => EntityBody::Player(PlayerData::default()),
            EntityKind::Script => EntityBody::Script(ScriptData::default()),
            EntityKind::Enemy => EntityBody::Enemy(EnemyData::default()),
            EntityKind::Bullet => EntityBody::Bullet(BulletData::default()),
            EntityKind::Boss => EntityBody::Boss(BossData::default()),
            EntityKind::BossForm => EntityBody::BossForm(BossFormData::default()),
            EntityKind::Stage => EntityBody::Stage(StageData::default()),
            EntityKind::Background => EntityBody::Background(BackgroundData::default()),
            EntityKind::Consumable => EntityBody::Consumable(ConsumableData::default()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            EntityBody::Sprite(_) => EntityKind::Sprite,
            EntityBody::Sound(_) => EntityKind::Sound,
            EntityBody::Player(_) => EntityKind::Player,
            EntityBody::Script(_) => EntityKind::Script,
            EntityBody::Enemy(_) => EntityKind::Enemy,
            EntityBody::Bullet(_) => EntityKind::Bullet,
            EntityBody::Boss(_) => EntityKind::Boss,
            EntityBody::BossForm(_) => EntityKind::BossForm,
            EntityBody::Stage(_) => EntityKind::Stage,
            EntityBody::Background(_) => EntityKind::Background,
            EntityBody::Consumable(_) => EntityKind::Consumable,
        }
    }

    pub fn script_id(&self) -> Option<ObjectId> {
        match self {
            EntityBody::Player(data) => Some(data.script_id),
            EntityBody::Enemy(data) => Some(data.script_id),
            EntityBody::Bullet(data) => Some(data.script_id),
            EntityBody::BossForm(data) => Some(data.script_id),
            EntityBody::Consumable(data) => Some(data.script_id),
            _ => None,
        }
    }

    pub fn sprite_id(&self) -> Option<ObjectId> {
        match self {
            EntityBody::Player(data) => Some(data.sprite_id),
            EntityBody::Enemy(data) => Some(data.sprite_id),
            EntityBody::Bullet(data) => Some(data.sprite_id),
            EntityBody::BossForm(data) => Some(data.sprite_id),
            EntityBody::Consumable(data) => Some(data.sprite_id),
            _ => None,
        }
    }

    pub fn bullet_id(&self) -> Option<ObjectId> {
        match self {
            EntityBody::Player(data) => Some(data.bullet_id),
            EntityBody::Enemy(data) => Some(data.bullet_id),
            EntityBody::BossForm(data) => Some(data.bullet_id),
            _ => None,
        }
    }
}

/// A typed object in the project graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: ObjectId,
    pub name: String,
    #[serde(flatten)]
    pub body: EntityBody,
}

impl Entity {
    pub fn new(id: ObjectId, name: impl Into<String>, body: EntityBody) -> Self {
        Self { id, name: name.into(), body }
    }

    pub fn kind(&self) -> EntityKind {
        self.body.kind()
    }

    /// Value of a single foreign-id field by its serialized name (`spriteId`, `bossId`, ...).
    /// Returns `None` when this kind has no such field.
    pub fn reference(&self, field: &str) -> Option<ObjectId> {
        match field {
            "spriteId" => self.body.sprite_id(),
            "scriptId" => self.body.script_id(),
            "bulletId" => self.body.bullet_id(),
            "backgroundId" => self.as_stage().map(|stage| stage.background_id),
            "musicId" => self.as_stage().map(|stage| stage.music_id),
            "bossId" => self.as_stage().map(|stage| stage.boss_id),
            "playerId" => self.as_stage().map(|stage| stage.player_id),
            _ => None,
        }
    }

    /// Value of a foreign-id list field by its serialized name (`formIds`).
    pub fn reference_list(&self, field: &str) -> Option<&[ObjectId]> {
        match (field, &self.body) {
            ("formIds", EntityBody::Boss(boss)) => Some(&boss.form_ids),
            _ => None,
        }
    }

    pub fn script_id(&self) -> Option<ObjectId> {
        self.body.script_id()
    }

    pub fn as_sprite(&self) -> Option<&SpriteData> {
        match &self.body {
            EntityBody::Sprite(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_script(&self) -> Option<&ScriptData> {
        match &self.body {
            EntityBody::Script(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_stage(&self) -> Option<&StageData> {
        match &self.body {
            EntityBody::Stage(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_stage_mut(&mut self) -> Option<&mut StageData> {
        match &mut self.body {
            EntityBody::Stage(data) => Some(data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectSettings {
    pub name: String,
    pub stage_size: Point,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self { name: "Untitled".to_string(), stage_size: DEFAULT_STAGE_SIZE }
    }
}

/// Immutable project snapshot. Edits produce a new value that shares every untouched entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "ProjectFile", into = "ProjectFile")]
pub struct Project {
    settings: Arc<ProjectSettings>,
    objects: Vector<Arc<Entity>>,
    index: ImHashMap<ObjectId, usize>,
}

#[derive(Serialize, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    settings: Arc<ProjectSettings>,
    #[serde(default)]
    objects: Vector<Arc<Entity>>,
}

impl From<ProjectFile> for Project {
    fn from(file: ProjectFile) -> Self {
        Project::from_parts(file.settings, file.objects)
    }
}

impl From<Project> for ProjectFile {
    fn from(project: Project) -> Self {
        ProjectFile { settings: project.settings, objects: project.objects }
    }
}

impl Project {
    pub fn new(settings: ProjectSettings) -> Self {
        Self::from_parts(Arc::new(settings), Vector::new())
    }

    pub fn from_parts(settings: Arc<ProjectSettings>, objects: Vector<Arc<Entity>>) -> Self {
        let index = build_index(&objects);
        Self { settings, objects, index }
    }

    pub fn from_entities(settings: ProjectSettings, entities: impl IntoIterator<Item = Entity>) -> Self {
        Self::from_parts(Arc::new(settings), entities.into_iter().map(Arc::new).collect())
    }

    pub fn settings(&self) -> &Arc<ProjectSettings> {
        &self.settings
    }

    pub fn objects(&self) -> impl Iterator<Item = &Arc<Entity>> + '_ {
        self.objects.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn index_of(&self, id: ObjectId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.index.contains_key(&id)
    }

    /// Entity with `id`. Negative ids are the unset sentinel and never match.
    pub fn get(&self, id: ObjectId) -> Option<&Arc<Entity>> {
        if id < 0 {
            return None;
        }
        self.index_of(id).and_then(|idx| self.objects.get(idx))
    }

    pub fn at(&self, index: usize) -> Option<&Arc<Entity>> {
        self.objects.get(index)
    }

    pub fn with_settings(&self, settings: Arc<ProjectSettings>) -> Self {
        Self { settings, objects: self.objects.clone(), index: self.index.clone() }
    }

    pub fn with_pushed(&self, entity: Arc<Entity>) -> Self {
        let mut next = self.clone();
        let position = next.objects.len();
        if !next.index.contains_key(&entity.id) {
            next.index.insert(entity.id, position);
        }
        next.objects.push_back(entity);
        next
    }

    /// Replaces the entity at `index`. The caller keeps the id stable.
    pub fn with_replaced(&self, index: usize, entity: Arc<Entity>) -> Self {
        let mut next = self.clone();
        next.objects.set(index, entity);
        next
    }

    pub fn with_removed(&self, index: usize) -> Self {
        let mut objects = self.objects.clone();
        objects.remove(index);
        Self::from_parts(self.settings.clone(), objects)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read project file {}", path.display()))?;
        let project = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse project file {}", path.display()))?;
        Ok(project)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Creating project directory {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(self).context("Serializing project")?;
        fs::write(path, json).with_context(|| format!("Writing project file {}", path.display()))?;
        Ok(())
    }
}

fn build_index(objects: &Vector<Arc<Entity>>) -> ImHashMap<ObjectId, usize> {
    let mut index = ImHashMap::new();
    for (position, entity) in objects.iter().enumerate() {
        // First occurrence wins, matching linear search order.
        if !index.contains_key(&entity.id) {
            index.insert(entity.id, position);
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_serializes_flat_with_type_tag() {
        let entity = Entity::new(4, "Boss Form", EntityBody::default_for(EntityKind::BossForm));
        let json = serde_json::to_value(&entity).expect("serialize entity");
        assert_eq!(json["type"], "bossForm");
        assert_eq!(json["id"], 4);
        assert_eq!(json["spriteId"], -1);
        assert_eq!(json["lifetime"], 1800);
    }

    #[test]
    fn entity_fills_missing_fields_with_defaults() {
        let entity: Entity =
            serde_json::from_str(r#"{"id": 2, "name": "Grunt", "type": "enemy", "scriptId": 7}"#)
                .expect("parse enemy");
        assert_eq!(entity.kind(), EntityKind::Enemy);
        assert_eq!(entity.reference("scriptId"), Some(7));
        assert_eq!(entity.reference("spriteId"), Some(UNSET_ID));
        assert_eq!(entity.reference("backgroundId"), None);
    }

    #[test]
    fn index_tracks_positions_after_removal() {
        let project = Project::from_entities(
            ProjectSettings::default(),
            (0..4).map(|id| Entity::new(id, format!("s{id}"), EntityBody::default_for(EntityKind::Sprite))),
        );
        let trimmed = project.with_removed(1);
        assert_eq!(trimmed.index_of(0), Some(0));
        assert_eq!(trimmed.index_of(1), None);
        assert_eq!(trimmed.index_of(2), Some(1));
        assert_eq!(trimmed.index_of(3), Some(2));
        assert!(Arc::ptr_eq(project.get(3).expect("old"), trimmed.get(3).expect("new")));
    }

    #[test]
    fn negative_ids_never_resolve() {
        let project = Project::default();
        assert!(project.get(UNSET_ID).is_none());
        assert!(project.get(0).is_none());
    }
}
