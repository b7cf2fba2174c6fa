use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_MAX_FREE_USES: u32 = 3;

/// Where analysis history rows are kept.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    /// The hosted relational backend (rows scoped to the signed-in user).
    #[default]
    Remote,
    /// A SQLite file in the state directory.
    Local,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted backend, e.g. `https://xyz.supabase.co`.
    pub backend_url: Option<String>,
    /// Publishable (anon) key sent with every request.
    pub anon_key: Option<String>,
    #[serde(default = "default_max_free_uses")]
    pub max_free_uses: u32,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub history_backend: HistoryBackend,
    #[serde(default = "default_true")]
    pub save_history: bool,
}

fn default_max_free_uses() -> u32 {
    DEFAULT_MAX_FREE_USES
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            backend_url: None,
            anon_key: None,
            max_free_uses: DEFAULT_MAX_FREE_USES,
            request_timeout_secs: None,
            history_backend: HistoryBackend::Remote,
            save_history: true,
        }
    }

    /// Load the config file (defaults when absent), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        let mut config = if config_path.exists() {
            let config_content = fs::read_to_string(&config_path)?;
            serde_json::from_str(&config_content)?
        } else {
            Self::new()
        };

        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("TRUTHLENS_URL") {
            self.backend_url = Some(url);
        }
        if let Ok(key) = std::env::var("TRUTHLENS_ANON_KEY") {
            self.anon_key = Some(key);
        }
    }

    /// Backend URL without a trailing slash.
    pub fn backend_url(&self) -> Result<String> {
        self.backend_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                Error::Validation(
                    "Backend URL not configured. Set TRUTHLENS_URL or backend_url in config.json"
                        .to_string(),
                )
            })
    }

    pub fn anon_key(&self) -> Result<String> {
        self.anon_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
            Error::Validation(
                "Anon key not configured. Set TRUTHLENS_ANON_KEY or anon_key in config.json"
                    .to_string(),
            )
        })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    /// Directory holding config.json and the local state files.
    pub fn state_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            Error::Storage("Could not determine config directory".to_string())
        })?;

        Ok(config_dir.join("truthlens"))
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::state_dir()?.join("config.json"))
    }
}
