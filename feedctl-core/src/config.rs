use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

pub const APP_DIR: &str = "feedctl";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UrlSourceKind {
    #[default]
    Local,
    RemoteList,
    RemoteAccount,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    None,
    FirstTag,
}

#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: String,
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("login", &self.login)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub urls_source: UrlSourceKind,
    pub remote: RemoteConfig,
    pub cache_file: Option<PathBuf>,
    pub reload_threads: usize,
    pub feed_sort_order: SortOrder,
    pub refresh_on_startup: bool,
    pub notify_format: String,
    pub notify_screen: bool,
    pub notify_xterm: bool,
    pub notify_program: Option<String>,
    pub download_path: String,
    pub podcast_auto_enqueue: bool,
    pub reset_unread_on_update: Vec<String>,
    pub max_items: usize,
    pub request_timeout_seconds: u64,
    pub retry_attempts: u8,
    pub retry_backoff_ms: u64,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            urls_source: UrlSourceKind::Local,
            remote: RemoteConfig::default(),
            cache_file: None,
            reload_threads: 1,
            feed_sort_order: SortOrder::None,
            refresh_on_startup: false,
            notify_format: "feedctl: finished reload, %f unread feeds (%n unread articles total)"
                .to_string(),
            notify_screen: false,
            notify_xterm: false,
            notify_program: None,
            download_path: "~/".to_string(),
            podcast_auto_enqueue: false,
            reset_unread_on_update: Vec::new(),
            max_items: 0,
            request_timeout_seconds: 30,
            retry_attempts: 1,
            retry_backoff_ms: 500,
            user_agent: format!("feedctl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// `<config_dir>/feedctl`, the home of the URL list, cache, queue and config.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR))
    }

    /// Loads the configuration; a missing file yields the defaults, which are
    /// written back so the user has something to edit.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no configuration file, using defaults");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!(error = %e, "failed to write default configuration");
                }
                Ok(config)
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_err)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn resets_unread(&self, feed_url: &str) -> bool {
        self.reset_unread_on_update.iter().any(|u| u == feed_url)
    }
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.display().to_string();
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: Config =
            serde_json::from_str(r#"{"reload_threads": 4, "feed_sort_order": "firsttag"}"#)
                .unwrap();
        assert_eq!(cfg.reload_threads, 4);
        assert_eq!(cfg.feed_sort_order, SortOrder::FirstTag);
        assert_eq!(cfg.urls_source, UrlSourceKind::Local);
        assert!(cfg.notify_format.contains("%f"));
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.reload_threads, 1);
        assert!(path.exists());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn remote_password_is_redacted() {
        let remote = RemoteConfig {
            url: "https://example.com".into(),
            login: "me".into(),
            password: "secret".into(),
        };
        assert!(!format!("{remote:?}").contains("secret"));
    }
}
