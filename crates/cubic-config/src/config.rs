//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// World generation and persistence.
    pub world: WorldConfig,
    /// Which chunks are kept loaded around the viewer.
    pub streaming: StreamingConfig,
    /// Chunk object pool.
    pub pool: PoolConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// World generation and persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Seed for terrain noise and structure placement.
    pub seed: u64,
    /// World Y at or above which an all-air chunk is lit by open sky.
    pub open_sky_y: i32,
    /// Sea level for the heightmap generator.
    pub sea_level: i32,
    /// Directory for saved chunks. `None` keeps the world in memory only.
    pub save_dir: Option<PathBuf>,
}

/// Chunk streaming around the viewer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Horizontal radius, in chunks.
    pub view_distance: u32,
    /// Vertical radius, in chunks.
    pub vertical_view_distance: u32,
    /// Lifecycle state relevant chunks are advanced to (e.g. "Drawable").
    pub target_state: String,
}

/// Chunk pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Evicted chunks kept for reuse; beyond this they are freed.
    pub max_pooled_chunks: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Directory for the JSON log file in debug builds.
    pub log_dir: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            open_sky_y: 64,
            sea_level: 32,
            save_dir: None,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            view_distance: 4,
            vertical_view_distance: 2,
            target_state: "Drawable".to_string(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pooled_chunks: 1024,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Platform config directory for the engine (`<config dir>/cubic`), or the
/// working directory if the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("cubic"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
