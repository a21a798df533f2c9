use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CrmError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub backend_url: String,
    pub api_key: String,
    /// Session token of the signed-in user; never written to disk.
    #[serde(skip)]
    pub access_token: Option<String>,
    pub stale_time_secs: u64,
    pub query_retry: u32,
    pub ui: UiPreferences,
}

/// Display preferences, read once at startup and handed to views through
/// [`crate::CrmContext`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiPreferences {
    pub theme: Theme,
    pub compact_tables: bool,
    pub page_size: usize,
    pub show_deleted_warning: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            compact_tables: false,
            page_size: 25,
            show_deleted_warning: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            api_key: String::new(),
            access_token: None,
            stale_time_secs: 5 * 60,
            query_retry: 3,
            ui: UiPreferences::default(),
        }
    }
}

impl AppConfig {
    /// `<config dir>/kitchen-pantry-crm`, falling back to the working directory.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("kitchen-pantry-crm"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn load(config_dir: &Path) -> Self {
        let config_path = config_dir.join("config.json");
        let mut config = if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                    log::warn!("Ignoring unreadable {}: {}", config_path.display(), e);
                    Self::default()
                }),
                Err(_) => Self::default(),
            }
        } else {
            let c = Self::default();
            if let Err(e) = c.save(config_dir) {
                log::warn!("Could not write default config: {}", e);
            }
            c
        };

        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Environment values win over the file when set and non-empty.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| var(name).filter(|v| !v.is_empty());

        if let Some(url) = non_empty("CRM_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Some(key) = non_empty("CRM_API_KEY") {
            self.api_key = key;
        }
        if let Some(token) = non_empty("CRM_ACCESS_TOKEN") {
            self.access_token = Some(token);
        }
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(config_dir)
            .map_err(|e| CrmError::Config(format!("Failed to create config dir: {}", e)))?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_dir.join("config.json"), content)
            .map_err(|e| CrmError::Config(format!("Failed to write config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path());

        assert_eq!(config.stale_time_secs, 300);
        assert_eq!(config.ui.page_size, 25);
        assert!(dir.path().join("config.json").exists());
    }

    #[test]
    fn save_round_trips_without_the_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig {
            backend_url: "https://crm.example.com".into(),
            access_token: Some("secret".into()),
            ..AppConfig::default()
        };
        config.ui.theme = Theme::Dark;
        config.save(dir.path()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
        assert!(!raw.contains("secret"));

        let loaded: AppConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(loaded.backend_url, "https://crm.example.com");
        assert_eq!(loaded.ui.theme, Theme::Dark);
        assert_eq!(loaded.access_token, None);
    }

    #[test]
    fn env_overrides_non_empty_values_only() {
        let mut config = AppConfig {
            api_key: "from-file".into(),
            ..AppConfig::default()
        };
        config.apply_env(|name| match name {
            "CRM_BACKEND_URL" => Some("https://env.example.com".into()),
            "CRM_API_KEY" => Some(String::new()),
            _ => None,
        });

        assert_eq!(config.backend_url, "https://env.example.com");
        assert_eq!(config.api_key, "from-file");
    }
}
