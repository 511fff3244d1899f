//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/synctree/synctree.toml`
//! 3. Explicit config file passed to [`Settings::load`]
//! 4. Environment variables: `SYNCTREE_*` prefix, `__` between nested keys

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{TreeError, TreeResult};

/// Undo history configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UndoSettings {
    /// Transactions kept in the history, oldest dropped first (0 = unlimited)
    pub max_transactions: usize,
}

impl Default for UndoSettings {
    fn default() -> Self {
        Self {
            max_transactions: 100,
        }
    }
}

/// Raw settings for intermediate parsing (`None` = not specified, inherit).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub delete_invalid_children: Option<bool>,
    pub undo: RawUndoSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawUndoSettings {
    pub max_transactions: Option<usize>,
}

/// Unified configuration for synctree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Remove children that no list accepts while populating it (default: true)
    pub delete_invalid_children: bool,
    /// Undo history settings
    pub undo: UndoSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            delete_invalid_children: true,
            undo: UndoSettings::default(),
        }
    }
}

/// Get the XDG config directory for synctree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "synctree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("synctree.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> TreeResult<RawSettings> {
    let content = std::fs::read_to_string(path).map_err(|e| TreeError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| TreeError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            delete_invalid_children: overlay
                .delete_invalid_children
                .unwrap_or(self.delete_invalid_children),
            undo: UndoSettings {
                max_transactions: overlay
                    .undo
                    .max_transactions
                    .unwrap_or(self.undo.max_transactions),
            },
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `config_file` - Optional file layered on top of the global config.
    ///   A path that does not exist is skipped.
    pub fn load(config_file: Option<&Path>) -> TreeResult<Self> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                debug!(path = %global_path.display(), "loading global config");
                current = current.merge_with(&load_raw_settings(&global_path)?);
            }
        }

        if let Some(path) = config_file {
            if path.exists() {
                debug!(path = %path.display(), "loading config file");
                current = current.merge_with(&load_raw_settings(path)?);
            }
        }

        Self::apply_env_overrides(current)
    }

    /// Apply SYNCTREE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> TreeResult<Self> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("SYNCTREE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(config_err)?;

        if let Some(val) = env_value(config.get_bool("delete_invalid_children"))? {
            settings.delete_invalid_children = val;
        }
        if let Some(val) = env_value(config.get_int("undo.max_transactions"))? {
            settings.undo.max_transactions = usize::try_from(val).map_err(|_| TreeError::Config {
                message: format!("undo.max_transactions must not be negative: {val}"),
            })?;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> TreeResult<String> {
        toml::to_string_pretty(self).map_err(|e| TreeError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# synctree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/synctree/synctree.toml
#   File:   path passed to Settings::load
#   Env:    SYNCTREE_* environment variables (SYNCTREE_UNDO__MAX_TRANSACTIONS=50)

# Remove children no list accepts while populating a list
# delete_invalid_children = true

[undo]
# Transactions kept in the undo history (0 = unlimited)
# max_transactions = 100
"#
        .to_string()
    }
}

/// Absent keys are `None`; present but unparsable ones are errors.
fn env_value<T>(result: Result<T, ConfigError>) -> TreeResult<Option<T>> {
    match result {
        Ok(val) => Ok(Some(val)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(config_err(e)),
    }
}

fn config_err(e: ConfigError) -> TreeError {
    TreeError::Config {
        message: e.to_string(),
    }
}
