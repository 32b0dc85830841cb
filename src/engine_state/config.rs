//! Streaming configuration, loaded from JSON.
//!
//! Every field has a default, so an empty object `{}` is a valid config.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task_management::{default_stale_workers, SchedulerOptions};
use super::voxels::coords::PlanetSize;
use super::voxels::world::GenerationMethod;

/// Largest supported `view_range`.
pub const MAX_VIEW_RANGE: u32 = 8;

/// Errors from loading or validating a config.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON for a config
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    /// The values are inconsistent
    #[error("invalid config: {0}")]
    Invalid(String),
    /// The world would evict chunks the window still shows
    #[error("world.cache_capacity {capacity} is smaller than the {window} chunks of the window")]
    CacheTooSmall {
        /// Configured capacity
        capacity: usize,
        /// Chunks resident in the window
        window: usize,
    },
}

/// How the reference world is generated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Terrain generation method
    pub generation: GenerationMethod,
    /// Noise seed
    pub seed: u32,
    /// Chunks the world keeps before evicting
    pub cache_capacity: usize,
    /// Generate in the background instead of on request
    pub deferred: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            generation: GenerationMethod::default(),
            seed: 0,
            cache_capacity: 4096,
            deferred: false,
        }
    }
}

/// Settings of the streaming core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// The window is `2^view_range` columns per side
    pub view_range: u32,
    /// Planet size in chunks
    pub planet_size: PlanetSize,
    /// Stale-scan workers; derived from hardware parallelism when absent
    pub stale_workers: Option<usize>,
    /// Shade meshes with ambient occlusion
    pub ambient_occlusion: bool,
    /// Milliseconds between retries while slots stay stale
    pub retry_interval_ms: u64,
    /// Deferred passes before a chunk is reported as persistent pop-in
    pub pop_in_warning_passes: u32,
    /// Camera near plane distance
    pub near_plane: f32,
    /// The reference world
    pub world: WorldConfig,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            view_range: 4,
            planet_size: PlanetSize::new(64, 64, 4),
            stale_workers: None,
            ambient_occlusion: true,
            retry_interval_ms: 250,
            pop_in_warning_passes: 8,
            near_plane: 0.1,
            world: WorldConfig::default(),
        }
    }
}

impl StreamingConfig {
    /// Parses and validates a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Columns per window side.
    pub fn span(&self) -> i32 {
        1 << self.view_range
    }

    /// Chunks resident in a full window.
    pub fn window_chunks(&self) -> usize {
        let span = self.span() as usize;
        span * span * self.planet_size.z.max(0) as usize
    }

    /// Checks that the window fits the planet.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_VIEW_RANGE).contains(&self.view_range) {
            return Err(ConfigError::Invalid(format!(
                "view_range must be between 1 and {}, got {}",
                MAX_VIEW_RANGE, self.view_range
            )));
        }
        let span = self.span();
        let planet = self.planet_size;
        if planet.x <= 0 || planet.y <= 0 || planet.x % span != 0 || planet.y % span != 0 {
            return Err(ConfigError::Invalid(format!(
                "planet size {}x{} must be a positive multiple of the window span {}",
                planet.x, planet.y, span
            )));
        }
        if planet.z < 1 {
            return Err(ConfigError::Invalid(format!(
                "planet needs at least one chunk layer, got {}",
                planet.z
            )));
        }
        if self.stale_workers == Some(0) {
            return Err(ConfigError::Invalid("stale_workers must be at least 1".to_string()));
        }
        let window = self.window_chunks();
        if self.world.cache_capacity < window {
            return Err(ConfigError::CacheTooSmall {
                capacity: self.world.cache_capacity,
                window,
            });
        }
        Ok(())
    }

    /// Stale-scan workers, either configured or derived from the machine.
    pub fn stale_workers(&self) -> usize {
        self.stale_workers.unwrap_or_else(|| {
            let parallelism = std::thread::available_parallelism().map_or(1, |count| count.get());
            default_stale_workers(parallelism)
        })
    }

    /// The scheduler settings this config describes.
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            stale_workers: self.stale_workers(),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            ambient_occlusion: self.ambient_occlusion,
            pop_in_warning_passes: self.pop_in_warning_passes,
            near_plane: self.near_plane,
        }
    }
}

/// Reads and validates a config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<StreamingConfig, ConfigError> {
    let file = File::open(path)?;
    let config: StreamingConfig = serde_json::from_reader(BufReader::new(file))?;
    config.validate()?;
    Ok(config)
}
