//! Configuration file parser for ~/.config/tidemark/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`,
//! which is enough to browse an existing local database. Syncing requires
//! `api_url` (and usually `api_token`) to be set.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks `api_token` so the sync credential never lands in
/// logs or error messages.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the aggregation service API (Reader-style endpoints).
    /// Empty string means sync is unconfigured.
    pub api_url: String,

    /// Bearer token for the aggregation service.
    /// The TIDEMARK_API_TOKEN env var takes precedence over this key.
    pub api_token: Option<String>,

    /// Base URL of the reader-proxy used to fetch full article content.
    /// Empty string disables content fetching entirely.
    pub proxy_url: String,

    /// Background sync interval in minutes. 0 = manual sync only.
    pub sync_interval_minutes: u64,

    /// Whether to mark articles as read when opened in the reader.
    pub mark_read_on_open: bool,

    /// How long a saved article-list snapshot stays restorable, in minutes.
    pub list_state_ttl_minutes: u64,

    /// Whether truncated articles are fetched automatically on open.
    /// When false, full content is only fetched on manual request.
    pub auto_parse: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_token: None,
            proxy_url: "https://r.jina.ai".to_string(),
            sync_interval_minutes: 0,
            mark_read_on_open: true,
            list_state_ttl_minutes: 30,
            auto_parse: true,
        }
    }
}

/// Mask api_token in Debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("proxy_url", &self.proxy_url)
            .field("sync_interval_minutes", &self.sync_interval_minutes)
            .field("mark_read_on_open", &self.mark_read_on_open)
            .field("list_state_ttl_minutes", &self.list_state_ttl_minutes)
            .field("auto_parse", &self.auto_parse)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted, logged as a warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to bound memory use on a corrupted file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to warn about probable typos
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "api_url",
                "api_token",
                "proxy_url",
                "sync_interval_minutes",
                "mark_read_on_open",
                "list_state_ttl_minutes",
                "auto_parse",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), api_url = %config.api_url, "Loaded configuration");
        Ok(config)
    }

    /// Resolve the API token: env var wins over the config file.
    pub fn resolved_api_token(&self) -> Option<secrecy::SecretString> {
        std::env::var("TIDEMARK_API_TOKEN")
            .ok()
            .or_else(|| self.api_token.clone())
            .map(secrecy::SecretString::from)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.api_url.is_empty());
        assert!(config.api_token.is_none());
        assert_eq!(config.proxy_url, "https://r.jina.ai");
        assert_eq!(config.sync_interval_minutes, 0);
        assert!(config.mark_read_on_open);
        assert_eq!(config.list_state_ttl_minutes, 30);
        assert!(config.auto_parse);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/tidemark_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert!(config.api_url.is_empty());
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = std::env::temp_dir().join("tidemark_config_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.mark_read_on_open);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = std::env::temp_dir().join("tidemark_config_test_partial");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "sync_interval_minutes = 15\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.sync_interval_minutes, 15);
        assert!(config.mark_read_on_open); // default
        assert_eq!(config.list_state_ttl_minutes, 30); // default

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("tidemark_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
api_url = "https://reader.example.com/api/0"
api_token = "test-token-123"
proxy_url = "https://proxy.example.com"
sync_interval_minutes = 30
mark_read_on_open = false
list_state_ttl_minutes = 60
auto_parse = false
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api_url, "https://reader.example.com/api/0");
        assert_eq!(config.api_token.as_deref(), Some("test-token-123"));
        assert_eq!(config.proxy_url, "https://proxy.example.com");
        assert_eq!(config.sync_interval_minutes, 30);
        assert!(!config.mark_read_on_open);
        assert_eq!(config.list_state_ttl_minutes, 60);
        assert!(!config.auto_parse);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("tidemark_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = std::env::temp_dir().join("tidemark_config_test_unknown");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "totally_fake_key = \"should not fail\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.api_url.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("tidemark_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::TooLarge(_))));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_debug_masks_api_token() {
        let config = Config {
            api_token: Some("super-secret-token-12345".to_string()),
            ..Config::default()
        };

        let debug_output = format!("{:?}", config);
        assert!(
            !debug_output.contains("super-secret-token-12345"),
            "Debug output should not contain the API token"
        );
        assert!(debug_output.contains("[REDACTED]"));
    }
}
