//! # Application Configuration
//!
//! One TOML file holds everything the explorer needs at startup:
//!
//! ```toml
//! [broker]
//! address = "localhost"
//! port = 1883
//!
//! [reconnect]
//! interval_ms = 2500
//! max_attempts = 5
//!
//! [explorer]
//! history_limit = 1
//! filter = ""
//!
//! [simulator]
//! enabled = false
//!
//! [[dashboard]]
//! name = "lamp"
//! topic = "home/lamp"
//! kind = "switch"
//! ```
//!
//! Every section and field is optional; missing values fall back to their
//! defaults. The file lives at `~/.config/mqtt-explorer/config.toml` unless a
//! path is given explicitly, and is created with defaults when missing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dashboard::WidgetConfig;
use crate::error::ConfigError;
use crate::mqtt::{ReconnectPolicy, SessionOptions};
use crate::simulator::SimulatorSettings;
use crate::topics::HistoryLimit;

const CONFIG_DIR: &str = ".config/mqtt-explorer";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ExplorerConfig {
    pub broker: SessionOptions,
    pub reconnect: ReconnectPolicy,
    pub explorer: ViewSettings,
    pub simulator: SimulatorSettings,
    pub dashboard: Vec<WidgetConfig>,
}

/// Local view settings applied to the message router.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ViewSettings {
    /// Messages kept per topic, zero or below keeps everything
    pub history_limit: i64,
    /// Initial topic filter, empty accepts every topic
    pub filter: String,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            history_limit: 1,
            filter: String::new(),
        }
    }
}

impl ViewSettings {
    pub fn history_limit(&self) -> HistoryLimit {
        HistoryLimit::new(self.history_limit)
    }
}

impl ExplorerConfig {
    /// `~/.config/mqtt-explorer/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(toml::from_str(&content)?)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await.map_err(io_error)?;
        debug!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Loads `path`, writing a default configuration there first if nothing
    /// exists yet.
    pub async fn ensure_default(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!("Creating default configuration at {}", path.display());
            let config = ExplorerConfig::default();
            config.save(path).await?;
            return Ok(config);
        }

        let config = Self::load(path).await?;
        if config.dashboard.len() > crate::dashboard::MAX_WIDGETS {
            warn!(
                "Config lists {} widgets, only the first {} are used",
                config.dashboard.len(),
                crate::dashboard::MAX_WIDGETS
            );
        }
        Ok(config)
    }
}
