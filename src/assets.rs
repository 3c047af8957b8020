use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec2;

use crate::model::{Entity, ObjectId};
use crate::store::ObjectStore;

/// Pixel dimensions of an image referenced by a sprite's `path`.
pub trait ImageSizeSource {
    fn image_size(&mut self, path: &str) -> Result<(u32, u32)>;
}

/// Reads image headers from disk and remembers the result per path.
#[derive(Debug, Default)]
pub struct ImageSizeCache {
    root: Option<PathBuf>,
    sizes: HashMap<String, (u32, u32)>,
}

impl ImageSizeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()), sizes: HashMap::new() }
    }

    /// Forgets a cached size, e.g. after the sprite's image was replaced.
    pub fn invalidate(&mut self, path: &str) -> bool {
        self.sizes.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.sizes.clear();
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ImageSizeSource for ImageSizeCache {
    fn image_size(&mut self, path: &str) -> Result<(u32, u32)> {
        if let Some(size) = self.sizes.get(path) {
            return Ok(*size);
        }
        let resolved = self.resolve(path);
        let size = image::image_dimensions(&resolved)
            .with_context(|| format!("Reading image dimensions of {}", resolved.display()))?;
        self.sizes.insert(path.to_string(), size);
        Ok(size)
    }
}

/// Size of one animation cell of `sprite`: the image width split evenly across `numCells`.
pub fn sprite_cell_size(sprite: &Entity, images: &mut dyn ImageSizeSource) -> Result<Vec2> {
    let Some(data) = sprite.as_sprite() else {
        bail!("object {} ('{}') is a {}, not a sprite", sprite.id, sprite.name, sprite.kind());
    };
    let (width, height) = images.image_size(&data.path)?;
    let cell_width = width / data.num_cells.max(1);
    Ok(Vec2::new(cell_width as f32, height as f32))
}

pub fn sprite_cell_size_by_id(
    store: &ObjectStore,
    sprite_id: ObjectId,
    images: &mut dyn ImageSizeSource,
) -> Result<Vec2> {
    let sprite = store.object_by_id(sprite_id).ok_or_else(|| anyhow!("bad sprite id {sprite_id}"))?;
    sprite_cell_size(&sprite, images)
}
