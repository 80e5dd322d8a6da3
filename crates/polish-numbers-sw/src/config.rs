//! Host configuration.
//!
//! Settings come from `~/.config/polish-numbers/config.json` when present,
//! then `POLISH_NUMBERS_*` environment variables (a `.env` file is loaded
//! first by `main`). The cache name and asset list are not configurable.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "polish-numbers";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Where the page and its assets are served from (the Flask dev server by default)
const DEFAULT_ORIGIN: &str = "http://127.0.0.1:5000";

/// Bind address for the local proxy
const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

const ENV_ORIGIN: &str = "POLISH_NUMBERS_ORIGIN";
const ENV_LISTEN: &str = "POLISH_NUMBERS_LISTEN";
const ENV_CACHE_DIR: &str = "POLISH_NUMBERS_CACHE_DIR";
const ENV_LOG_DIR: &str = "POLISH_NUMBERS_LOG_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub origin: String,
    pub listen: String,
    pub cache_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            listen: DEFAULT_LISTEN.to_string(),
            cache_dir: None,
            log_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Ok(path) => Self::load_from(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply environment overrides; empty values are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(origin) = lookup(ENV_ORIGIN) {
            self.origin = origin;
        }
        if let Some(listen) = lookup(ENV_LISTEN) {
            self.listen = listen;
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(dir));
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.origin, "http://127.0.0.1:5000");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"origin": "https://numbers.example.com"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.origin, "https://numbers.example.com");
        assert_eq!(config.listen, "127.0.0.1:8080");
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_ORIGIN, "http://10.0.0.2:5000"),
            (ENV_CACHE_DIR, "/var/cache/pn"),
            (ENV_LISTEN, "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.origin, "http://10.0.0.2:5000");
        assert_eq!(config.listen, "127.0.0.1:8080"); // blank is ignored
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/var/cache/pn"));
        assert!(config.log_dir.is_none());
    }
}
