//! Game configuration loaded from TOML.

use crate::error::ConfigError;
use crate::types::Color;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Complete configuration of a game session.
#[derive(Debug, Clone, Default, Getters, Serialize, Deserialize)]
pub struct GameConfig {
    /// Orchestrator settings.
    #[serde(default)]
    settings: GameSettings,

    /// White player.
    #[serde(default)]
    white: PlayerSpec,

    /// Black player.
    #[serde(default)]
    black: PlayerSpec,

    /// Move-generation engines known by name.
    #[serde(default)]
    engines: HashMap<String, EngineSpec>,
}

impl GameConfig {
    /// Loads configuration from TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(
            engines = config.engines.len(),
            white = ?config.white.kind,
            black = ?config.black.kind,
            "Config loaded successfully"
        );
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Player specification for `color`.
    pub fn player(&self, color: Color) -> &PlayerSpec {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (color, spec) in [(Color::White, &self.white), (Color::Black, &self.black)] {
            if spec.kind == PlayerKind::Engine && spec.engines.is_empty() {
                return Err(ConfigError::new(format!(
                    "{} is an engine player without engines",
                    color
                )));
            }
        }
        Ok(())
    }
}

/// Orchestrator timing and setup.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
pub struct GameSettings {
    /// Stalled-sync debounce in milliseconds.
    #[serde(default = "default_sync_debounce_ms")]
    sync_debounce_ms: u64,

    /// Extra debounce for castling moves in milliseconds.
    #[serde(default = "default_castle_grace_ms")]
    castle_grace_ms: u64,

    /// Event bus buffer per subscriber.
    #[serde(default = "default_event_capacity")]
    event_capacity: usize,

    /// Shuffle engine ensembles once per player.
    #[serde(default = "default_shuffle_engines")]
    shuffle_engines: bool,

    /// Starting position; the standard one when absent.
    #[serde(default)]
    start_fen: Option<String>,

    /// Seed moves replayed after loading the start position.
    #[serde(default)]
    moves: Option<String>,
}

#[instrument]
fn default_sync_debounce_ms() -> u64 {
    1250
}

#[instrument]
fn default_castle_grace_ms() -> u64 {
    1000
}

#[instrument]
fn default_event_capacity() -> usize {
    256
}

#[instrument]
fn default_shuffle_engines() -> bool {
    true
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            sync_debounce_ms: default_sync_debounce_ms(),
            castle_grace_ms: default_castle_grace_ms(),
            event_capacity: default_event_capacity(),
            shuffle_engines: default_shuffle_engines(),
            start_fen: None,
            moves: None,
        }
    }
}

impl GameSettings {
    /// Sets both debounce periods.
    pub fn with_debounce(mut self, sync: Duration, castle_grace: Duration) -> Self {
        self.sync_debounce_ms = sync.as_millis() as u64;
        self.castle_grace_ms = castle_grace.as_millis() as u64;
        self
    }

    /// Enables or disables ensemble shuffling.
    pub fn with_shuffle_engines(mut self, shuffle: bool) -> Self {
        self.shuffle_engines = shuffle;
        self
    }

    /// Stalled-sync debounce.
    pub fn sync_debounce(&self) -> Duration {
        Duration::from_millis(self.sync_debounce_ms)
    }

    /// Extra castling debounce.
    pub fn castle_grace(&self) -> Duration {
        Duration::from_millis(self.castle_grace_ms)
    }
}

/// How a player produces moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKind {
    /// Moves pieces on the physical board.
    #[default]
    Human,
    /// Asks move-generation engines.
    Engine,
}

/// One side's player.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
pub struct PlayerSpec {
    /// Human or engine.
    #[serde(default)]
    kind: PlayerKind,

    /// First name.
    #[serde(default)]
    first_name: String,

    /// Last name.
    #[serde(default)]
    last_name: String,

    /// Rating.
    #[serde(default)]
    rating: u32,

    /// Total clock time in seconds.
    #[serde(default = "default_total_time_secs")]
    total_time_secs: u64,

    /// Engine ensemble, by name in `[engines]`.
    #[serde(default)]
    engines: Vec<String>,

    /// Minimum time an engine turn takes, in milliseconds.
    #[serde(default = "default_min_think_ms")]
    min_think_ms: u64,

    /// Search depth.
    #[serde(default = "default_depth")]
    depth: u32,

    /// Ranked lines requested per search.
    #[serde(default = "default_multi_pv")]
    multi_pv: u32,
}

#[instrument]
fn default_total_time_secs() -> u64 {
    15 * 60
}

#[instrument]
fn default_min_think_ms() -> u64 {
    1
}

#[instrument]
fn default_depth() -> u32 {
    1
}

#[instrument]
fn default_multi_pv() -> u32 {
    10
}

impl Default for PlayerSpec {
    fn default() -> Self {
        Self {
            kind: PlayerKind::default(),
            first_name: String::new(),
            last_name: String::new(),
            rating: 0,
            total_time_secs: default_total_time_secs(),
            engines: Vec::new(),
            min_think_ms: default_min_think_ms(),
            depth: default_depth(),
            multi_pv: default_multi_pv(),
        }
    }
}

impl PlayerSpec {
    /// Engine player rotating over `engines`.
    pub fn engine(engines: Vec<String>) -> Self {
        Self {
            kind: PlayerKind::Engine,
            engines,
            ..Self::default()
        }
    }

    /// Human player.
    pub fn human(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            ..Self::default()
        }
    }

    /// Sets the minimum think time.
    pub fn with_min_think(mut self, min_think: Duration) -> Self {
        self.min_think_ms = min_think.as_millis() as u64;
        self
    }

    /// Total clock time.
    pub fn total_time(&self) -> Duration {
        Duration::from_secs(self.total_time_secs)
    }

    /// Minimum think time.
    pub fn min_think(&self) -> Duration {
        Duration::from_millis(self.min_think_ms)
    }
}

/// A configured move-generation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EngineSpec {
    /// External UCI engine process.
    Uci {
        /// Executable path.
        path: PathBuf,
        /// Play the n-th ranked line instead of the best move.
        #[serde(default)]
        pick_rank: Option<usize>,
        /// Options applied on every new game.
        #[serde(default)]
        init_options: HashMap<String, String>,
    },
    /// Uniformly random legal moves.
    Random {
        /// Fixed seed for reproducible games.
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl EngineSpec {
    /// Options applied on every new game.
    pub fn init_options(&self) -> HashMap<String, String> {
        match self {
            EngineSpec::Uci { init_options, .. } => init_options.clone(),
            EngineSpec::Random { .. } => HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GameConfig::from_toml("").unwrap();
        assert_eq!(*config.settings().sync_debounce_ms(), 1250);
        assert_eq!(config.settings().castle_grace(), Duration::from_secs(1));
        assert_eq!(*config.white().kind(), PlayerKind::Human);
        assert_eq!(config.black().total_time(), Duration::from_secs(900));
    }

    #[test]
    fn test_engine_player_requires_engines() {
        let err = GameConfig::from_toml("[black]\nkind = \"engine\"\n").unwrap_err();
        assert!(err.message.contains("black"));
    }
}
