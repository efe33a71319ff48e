//! Live game mode configuration
//!
//! The collection maps game mode ids to their metadata. It is read by the
//! coordinator and the queue commands, and can be updated in place while the
//! service runs, either through explicit updates or by re-reading its file.

use crate::error::{MatchmakingError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info};

/// Limits on how many players may queue together for a mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRestrictions {
    pub min_size: u32,
    pub max_size: u32,
}

impl Default for PartyRestrictions {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 1,
        }
    }
}

/// Metadata for one game mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameModeConfig {
    pub id: String,
    pub friendly_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub party_restrictions: PartyRestrictions,
}

fn default_enabled() -> bool {
    true
}

impl GameModeConfig {
    pub fn new(id: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            friendly_name: friendly_name.into(),
            enabled: true,
            party_restrictions: PartyRestrictions::default(),
        }
    }

    /// Stand-in used when a ticket names a mode this instance does not know
    pub fn unresolved(id: &str) -> Self {
        Self {
            id: id.to_string(),
            friendly_name: id.to_string(),
            enabled: false,
            party_restrictions: PartyRestrictions::default(),
        }
    }

    pub fn with_party_size(mut self, min_size: u32, max_size: u32) -> Self {
        self.party_restrictions = PartyRestrictions { min_size, max_size };
        self
    }
}

/// A change to the live collection
#[derive(Debug, Clone, PartialEq)]
pub enum GameModeUpdate {
    Upserted(GameModeConfig),
    Removed(String),
}

#[derive(Debug, Deserialize)]
struct GameModeFile {
    #[serde(default)]
    game_modes: Vec<GameModeConfig>,
}

/// Live-updating collection of game mode configs
#[derive(Debug, Default)]
pub struct GameModeCollection {
    modes: RwLock<HashMap<String, GameModeConfig>>,
}

impl GameModeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from a fixed list of configs
    pub fn with_configs(configs: impl IntoIterator<Item = GameModeConfig>) -> Self {
        let modes = configs
            .into_iter()
            .map(|config| (config.id.clone(), config))
            .collect();

        Self {
            modes: RwLock::new(modes),
        }
    }

    /// Load a collection from a TOML file with a `[[game_modes]]` array
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let configs = Self::read_file(path)?;
        info!(
            "Loaded {} game modes from {}",
            configs.len(),
            path.display()
        );
        Ok(Self::with_configs(configs))
    }

    fn read_file(path: &Path) -> Result<Vec<GameModeConfig>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read game modes file {}", path.display()))?;
        let file: GameModeFile = toml::from_str(&contents).map_err(|e| {
            MatchmakingError::ConfigurationError {
                message: format!("Invalid game modes file {}: {}", path.display(), e),
            }
        })?;
        Ok(file.game_modes)
    }

    /// Look up a mode by id
    pub fn get_config(&self, id: &str) -> Option<GameModeConfig> {
        self.modes.read().ok()?.get(id).cloned()
    }

    /// Every known mode, sorted by id
    pub fn all_configs(&self) -> Vec<GameModeConfig> {
        let mut configs: Vec<GameModeConfig> = self
            .modes
            .read()
            .map(|modes| modes.values().cloned().collect())
            .unwrap_or_default();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    pub fn enabled_configs(&self) -> Vec<GameModeConfig> {
        self.all_configs()
            .into_iter()
            .filter(|config| config.enabled)
            .collect()
    }

    /// Apply a single live update
    pub fn apply_update(&self, update: GameModeUpdate) -> Result<()> {
        let mut modes = self
            .modes
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("game modes"))?;

        match update {
            GameModeUpdate::Upserted(config) => {
                debug!("Game mode '{}' upserted", config.id);
                modes.insert(config.id.clone(), config);
            }
            GameModeUpdate::Removed(id) => {
                debug!("Game mode '{}' removed", id);
                modes.remove(&id);
            }
        }

        Ok(())
    }

    /// Re-read the backing file and apply whatever changed, returning the updates
    pub fn reload_from_file(&self, path: &Path) -> Result<Vec<GameModeUpdate>> {
        let fresh: HashMap<String, GameModeConfig> = Self::read_file(path)?
            .into_iter()
            .map(|config| (config.id.clone(), config))
            .collect();

        let updates = {
            let current = self
                .modes
                .read()
                .map_err(|_| MatchmakingError::lock_poisoned("game modes"))?;

            let mut updates: Vec<GameModeUpdate> = fresh
                .values()
                .filter(|config| current.get(&config.id) != Some(*config))
                .cloned()
                .map(GameModeUpdate::Upserted)
                .collect();
            updates.extend(
                current
                    .keys()
                    .filter(|id| !fresh.contains_key(*id))
                    .cloned()
                    .map(GameModeUpdate::Removed),
            );
            updates
        };

        for update in &updates {
            self.apply_update(update.clone())?;
        }

        if !updates.is_empty() {
            info!(
                "Applied {} game mode updates from {}",
                updates.len(),
                path.display()
            );
        }

        Ok(updates)
    }
}
