//! Application configuration for DocFrame.
//!
//! User config lives at `~/.docframe/docframe.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DocFrameError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docframe.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docframe";

// ---------------------------------------------------------------------------
// Config structs (matching docframe.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Explicit column → template identifier mappings.
    #[serde(default)]
    pub names: BTreeMap<String, String>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Name given to the synthetic index column on flatten and save.
    #[serde(default = "default_index_column")]
    pub index_column: String,

    /// What a series write does when several rows match the cursor.
    #[serde(default)]
    pub series_write_policy: SeriesWritePolicy,

    /// Directory relative output paths resolve against. Unset means next to
    /// the interface file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            index_column: default_index_column(),
            series_write_policy: SeriesWritePolicy::default(),
            output_dir: None,
        }
    }
}

fn default_index_column() -> String {
    "index".into()
}

/// Resolution rule for a series write whose cursor matches several rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesWritePolicy {
    /// Update the last physically matching row and warn.
    #[default]
    LastMatch,
    /// Update every matching row.
    AllMatches,
    /// Refuse the write.
    Reject,
}

impl fmt::Display for SeriesWritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LastMatch => "last_match",
            Self::AllMatches => "all_matches",
            Self::Reject => "reject",
        })
    }
}

// ---------------------------------------------------------------------------
// Frame settings (runtime, handed to every table constructor)
// ---------------------------------------------------------------------------

/// Engine settings derived once from [`AppConfig`] and passed by reference
/// into every frame constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSettings {
    /// Name of the synthetic index column.
    pub index_name: String,
    /// Multi-match policy for series writes.
    pub series_write_policy: SeriesWritePolicy,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FrameSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            index_name: config.defaults.index_column.clone(),
            series_write_policy: config.defaults.series_write_policy,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docframe/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DocFrameError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docframe/docframe.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocFrameError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocFrameError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocFrameError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocFrameError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocFrameError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
