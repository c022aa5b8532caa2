//! Data models and configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default quota-channel poll interval in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Application configuration
///
/// Loaded from `<config dir>/tally/config.json` with environment
/// overrides (`TALLY_BACKEND_URL`, `TALLY_API_KEY`,
/// `TALLY_ACCESS_TOKEN_PATH`, `TALLY_POLL_INTERVAL_SECS`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the backend (Supabase-style)
    pub backend_url: String,
    /// Public API key sent with every request
    pub api_key: String,
    /// Path to a file holding the user's access token; supports `~`
    pub access_token_path: Option<String>,
    /// Quota-channel poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            api_key: String::new(),
            access_token_path: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl AppConfig {
    /// Path of the config file.
    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| Error::config("could not determine config directory"))?;
        Ok(dir.join("tally").join("config.json"))
    }

    /// Load the configuration from disk, then apply env overrides.
    /// A missing file yields the defaults (still subject to overrides).
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_json(&content)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a configuration from a JSON string.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Persist the configuration to its default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("TALLY_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Ok(key) = std::env::var("TALLY_API_KEY") {
            self.api_key = key;
        }
        if let Ok(path) = std::env::var("TALLY_ACCESS_TOKEN_PATH") {
            self.access_token_path = Some(path);
        }
        if let Ok(secs) = std::env::var("TALLY_POLL_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                self.poll_interval_secs = secs;
            }
        }
    }

    /// Read the access token from the configured file, if any.
    /// A missing or unreadable file is "no token", not an error.
    pub fn access_token(&self) -> Option<String> {
        let path = self.access_token_path.as_deref()?;
        let expanded = shellexpand::tilde(path);
        match std::fs::read_to_string(expanded.as_ref()) {
            Ok(content) => {
                let token = content.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(token.to_string())
                }
            }
            Err(err) => {
                log::debug!("[models] access token not readable at {}: {}", path, err);
                None
            }
        }
    }

    /// Validate that the fields required for network access are set.
    pub fn validate(&self) -> Result<()> {
        if self.backend_url.is_empty() {
            return Err(Error::config("backend_url is not set"));
        }
        if self.api_key.is_empty() {
            return Err(Error::config("api_key is not set"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_from_json() {
        let config = AppConfig::from_json(
            r#"{
                "backend_url": "https://x.supabase.co",
                "api_key": "anon",
                "access_token_path": "~/.tally/token",
                "poll_interval_secs": 10
            }"#,
        )
        .unwrap();
        assert_eq!(config.backend_url, "https://x.supabase.co");
        assert_eq!(config.api_key, "anon");
        assert_eq!(config.poll_interval_secs, 10);
    }

    #[test]
    fn test_config_poll_interval_defaults() {
        let config = AppConfig::from_json(
            r#"{"backend_url": "https://x.supabase.co", "api_key": "anon", "access_token_path": null}"#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
    }

    #[test]
    fn test_config_from_invalid_json() {
        assert!(AppConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_validate_requires_url_and_key() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());
        config.backend_url = "https://x.supabase.co".to_string();
        assert!(config.validate().is_err());
        config.api_key = "anon".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_access_token_missing_file_is_none() {
        let config = AppConfig {
            access_token_path: Some("/nonexistent/tally-token".to_string()),
            ..Default::default()
        };
        assert_eq!(config.access_token(), None);
    }

    #[test]
    fn test_access_token_reads_and_trims() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  secret-token  ").unwrap();

        let config = AppConfig {
            access_token_path: Some(file.path().to_string_lossy().to_string()),
            ..Default::default()
        };
        assert_eq!(config.access_token(), Some("secret-token".to_string()));
    }

    #[test]
    fn test_access_token_empty_file_is_none() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = AppConfig {
            access_token_path: Some(file.path().to_string_lossy().to_string()),
            ..Default::default()
        };
        assert_eq!(config.access_token(), None);
    }

    #[test]
    fn test_no_token_path_is_none() {
        assert_eq!(AppConfig::default().access_token(), None);
    }
}
