use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "HistoryConfig::default_max_size")]
    pub max_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "ScriptConfig::default_max_operations")]
    pub max_operations: u64,
    #[serde(default = "ScriptConfig::default_max_call_levels")]
    pub max_call_levels: usize,
    #[serde(default = "ScriptConfig::default_max_expr_depth")]
    pub max_expr_depth: usize,
    #[serde(default = "ScriptConfig::default_max_string_size")]
    pub max_string_size: usize,
    #[serde(default = "ScriptConfig::default_max_array_size")]
    pub max_array_size: usize,
    #[serde(default = "ScriptConfig::default_max_map_size")]
    pub max_map_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "PreviewConfig::default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default = "PreviewConfig::default_frames")]
    pub frames: u32,
    /// Instances spawned in one frame at most; the rest wait for the next frame.
    #[serde(default = "PreviewConfig::default_max_spawns_per_frame")]
    pub max_spawns_per_frame: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StudioConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub scripts: ScriptConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Clone, Default)]
pub struct StudioConfigOverrides {
    pub max_history: Option<usize>,
    pub frames: Option<u32>,
    pub frame_rate: Option<u32>,
}

impl HistoryConfig {
    const fn default_max_size() -> usize {
        crate::store::DEFAULT_MAX_HISTORY
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_size: Self::default_max_size() }
    }
}

impl ScriptConfig {
    const fn default_max_operations() -> u64 {
        100_000
    }

    const fn default_max_call_levels() -> usize {
        64
    }

    const fn default_max_expr_depth() -> usize {
        64
    }

    const fn default_max_string_size() -> usize {
        10_000
    }

    const fn default_max_array_size() -> usize {
        1_000
    }

    const fn default_max_map_size() -> usize {
        500
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            max_operations: Self::default_max_operations(),
            max_call_levels: Self::default_max_call_levels(),
            max_expr_depth: Self::default_max_expr_depth(),
            max_string_size: Self::default_max_string_size(),
            max_array_size: Self::default_max_array_size(),
            max_map_size: Self::default_max_map_size(),
        }
    }
}

impl PreviewConfig {
    const fn default_frame_rate() -> u32 {
        60
    }

    const fn default_frames() -> u32 {
        600
    }

    const fn default_max_spawns_per_frame() -> u32 {
        256
    }

    /// Seconds per simulated frame.
    pub fn frame_delta(&self) -> f32 {
        1.0 / self.frame_rate.max(1) as f32
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            frame_rate: Self::default_frame_rate(),
            frames: Self::default_frames(),
            max_spawns_per_frame: Self::default_max_spawns_per_frame(),
        }
    }
}

impl StudioConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &StudioConfigOverrides) {
        if let Some(max_history) = overrides.max_history {
            self.history.max_size = max_history;
        }
        if let Some(frames) = overrides.frames {
            self.preview.frames = frames;
        }
        if let Some(frame_rate) = overrides.frame_rate {
            self.preview.frame_rate = frame_rate;
        }
    }
}

impl StudioConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.max_history.is_none() && self.frames.is_none() && self.frame_rate.is_none()
    }
}
