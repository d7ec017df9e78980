//! Worker configuration.
//!
//! The defaults describe the Scoundrel app: one store named `scoundrel-v1`
//! and a four-entry app shell. Paths are resolved against the scope URL the
//! worker controls.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::network::http::REQUEST_TIMEOUT_SECS;

/// Name of the current cache store
pub const CACHE_NAME: &str = "scoundrel-v1";

/// App shell to precache on install
pub const APP_SHELL: [&str; 4] = ["./", "./index.html", "./css/main.css", "./manifest.json"];

/// Document served when a navigation cannot reach the network
pub const FALLBACK_DOCUMENT: &str = "./index.html";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid scope URL {url}: {reason}")]
    InvalidScope { url: String, reason: String },

    #[error("Cannot resolve {path} against {scope}: {source}")]
    InvalidPath {
        path: String,
        scope: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub cache_name: String,
    /// Scope URL as a string; must be an absolute http(s) URL.
    pub scope: String,
    pub app_shell: Vec<String>,
    pub fallback_document: String,
    pub request_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: CACHE_NAME.to_string(),
            scope: "http://localhost:8080/".to_string(),
            app_shell: APP_SHELL.iter().map(|p| p.to_string()).collect(),
            fallback_document: FALLBACK_DOCUMENT.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    }
}

impl WorkerConfig {
    pub fn with_scope(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            ..Self::default()
        }
    }

    /// Parse the scope, normalising it to end in a slash so relative paths
    /// resolve inside it.
    pub fn scope_url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.scope).map_err(|e| ConfigError::InvalidScope {
            url: self.scope.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidScope {
                url: self.scope.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        let scope = self.scope_url()?;
        scope.join(path).map_err(|source| ConfigError::InvalidPath {
            path: path.to_string(),
            scope: scope.to_string(),
            source,
        })
    }

    pub fn app_shell_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.app_shell.iter().map(|p| self.resolve(p)).collect()
    }

    pub fn fallback_url(&self) -> Result<Url, ConfigError> {
        self.resolve(&self.fallback_document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name, "scoundrel-v1");
        assert_eq!(config.app_shell.len(), 4);
        assert_eq!(config.fallback_document, "./index.html");
    }

    #[test]
    fn test_app_shell_resolves_against_scope() {
        let config = WorkerConfig::with_scope("https://play.example/scoundrel");
        let urls: Vec<String> = config
            .app_shell_urls()
            .unwrap()
            .into_iter()
            .map(|u| u.to_string())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://play.example/scoundrel/",
                "https://play.example/scoundrel/index.html",
                "https://play.example/scoundrel/css/main.css",
                "https://play.example/scoundrel/manifest.json",
            ]
        );
    }

    #[test]
    fn test_fallback_url() {
        let config = WorkerConfig::with_scope("https://play.example/");
        assert_eq!(
            config.fallback_url().unwrap().as_str(),
            "https://play.example/index.html"
        );
    }

    #[test]
    fn test_invalid_scope() {
        assert!(WorkerConfig::with_scope("not a url").scope_url().is_err());
        assert!(WorkerConfig::with_scope("file:///tmp/").scope_url().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: WorkerConfig =
            serde_json::from_str(r#"{"scope": "https://play.example/"}"#).unwrap();
        assert_eq!(config.cache_name, CACHE_NAME);
        assert_eq!(config.request_timeout_secs, REQUEST_TIMEOUT_SECS);
    }
}
