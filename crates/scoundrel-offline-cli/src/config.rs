//! Command-line configuration management.
//!
//! Settings come from, in increasing priority:
//! `~/.config/scoundrel-offline/config.json`, the `SCOUNDREL_ORIGIN`
//! environment variable (a `.env` file is honoured), and `--origin`.
//!
//! Cached stores live under `~/.cache/scoundrel-offline/`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use scoundrel_offline_core::WorkerConfig;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "scoundrel-offline";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the configured origin
pub const ORIGIN_ENV: &str = "SCOUNDREL_ORIGIN";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Scope URL of the deployed app, e.g. `https://play.example/scoundrel/`
    pub origin: Option<String>,
    pub cache_name: Option<String>,
    pub app_shell: Option<Vec<String>>,
    pub fallback_document: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Replace the origin when `origin` is set and non-empty.
    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        if let Some(origin) = origin.filter(|o| !o.trim().is_empty()) {
            self.origin = Some(origin);
        }
        self
    }

    pub fn worker_config(&self) -> Result<WorkerConfig> {
        let origin = self.origin.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "No origin configured. Run `{} init <URL>`, set {} or pass --origin",
                APP_NAME,
                ORIGIN_ENV
            )
        })?;

        let mut config = WorkerConfig::with_scope(origin);
        if let Some(ref name) = self.cache_name {
            config.cache_name = name.clone();
        }
        if let Some(ref shell) = self.app_shell {
            config.app_shell = shell.clone();
        }
        if let Some(ref fallback) = self.fallback_document {
            config.fallback_document = fallback.clone();
        }
        if let Some(timeout) = self.request_timeout_secs {
            config.request_timeout_secs = timeout;
        }

        // Surface a bad origin here rather than on first use
        config.scope_url().context("Invalid origin")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_from(&tmp.path().join("config.json")).unwrap();
        assert!(config.origin.is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.json");
        let config = Config {
            origin: Some("https://play.example/".to_string()),
            cache_name: Some("scoundrel-v2".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.origin.as_deref(), Some("https://play.example/"));
        assert_eq!(loaded.cache_name.as_deref(), Some("scoundrel-v2"));
    }

    #[test]
    fn test_origin_override() {
        let config = Config {
            origin: Some("https://old.example/".to_string()),
            ..Config::default()
        };
        let config = config.with_origin(Some("https://new.example/".to_string()));
        assert_eq!(config.origin.as_deref(), Some("https://new.example/"));

        let config = config.with_origin(Some("  ".to_string()));
        assert_eq!(config.origin.as_deref(), Some("https://new.example/"));
    }

    #[test]
    fn test_worker_config_requires_origin() {
        assert!(Config::default().worker_config().is_err());
    }

    #[test]
    fn test_worker_config_applies_overrides() {
        let config = Config {
            origin: Some("https://play.example/scoundrel".to_string()),
            cache_name: Some("scoundrel-v2".to_string()),
            app_shell: Some(vec!["./index.html".to_string()]),
            fallback_document: None,
            request_timeout_secs: Some(5),
        };
        let worker = config.worker_config().unwrap();
        assert_eq!(worker.cache_name, "scoundrel-v2");
        assert_eq!(worker.app_shell, vec!["./index.html".to_string()]);
        assert_eq!(worker.fallback_document, "./index.html");
        assert_eq!(worker.request_timeout_secs, 5);
    }

    #[test]
    fn test_worker_config_rejects_bad_origin() {
        let config = Config::default().with_origin(Some("ftp://play.example/".to_string()));
        assert!(config.worker_config().is_err());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
