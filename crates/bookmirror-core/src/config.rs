//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/bookmirror/config.toml)
//! 3. Environment variables (BOOKMIRROR_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::Credentials;
use crate::structure::Backend;

/// Environment variable prefix
const ENV_PREFIX: &str = "BOOKMIRROR";

/// Keys accepted by `Config::set`
pub const SETTABLE_KEYS: &[&str] = &[
    "data_dir",
    "api_url",
    "access_token",
    "backend",
    "request_timeout_secs",
    "log_file",
];

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local state (search queue)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the remote API
    #[serde(default)]
    pub api_url: Option<String>,

    /// Token for job-issuing calls
    #[serde(default)]
    pub access_token: Option<String>,

    /// Which note backend the library is mirrored into
    #[serde(default)]
    pub backend: Backend,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Write logs here instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_url: None,
            access_token: None,
            backend: Backend::default(),
            request_timeout_secs: default_request_timeout_secs(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (BOOKMIRROR_DATA_DIR, BOOKMIRROR_API_URL,
    ///    BOOKMIRROR_ACCESS_TOKEN, BOOKMIRROR_BACKEND)
    /// 2. Config file (~/.config/bookmirror/config.toml or BOOKMIRROR_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from `path` when given (the CLI `--config` flag), else the default location
    pub fn load_with_cli_override(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // Empty string clears optional values
        if let Ok(val) = std::env::var(format!("{}_API_URL", ENV_PREFIX)) {
            self.api_url = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_ACCESS_TOKEN", ENV_PREFIX)) {
            self.access_token = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_BACKEND", ENV_PREFIX)) {
            self.backend = val
                .parse()
                .map_err(|e| anyhow!("Invalid {}_BACKEND: {}", ENV_PREFIX, e))?;
        }

        Ok(())
    }

    /// Set one field from its string form, as used by `config set`
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "api_url" => self.api_url = non_empty(value.to_string()),
            "access_token" => self.access_token = non_empty(value.to_string()),
            "backend" => self.backend = value.parse().map_err(anyhow::Error::msg)?,
            "request_timeout_secs" => self.request_timeout_secs = parse_positive(key, value)?,
            "log_file" => self.log_file = non_empty(value.to_string()).map(PathBuf::from),
            _ => bail!(
                "Unknown config key '{}'. Valid keys: {}",
                key,
                SETTABLE_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Ensure data directory exists
    pub fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with BOOKMIRROR_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bookmirror")
            .join("config.toml")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Credentials for job-issuing calls, if a token is configured
    pub fn credentials(&self) -> Option<Credentials> {
        self.access_token.as_deref().map(Credentials::new)
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.trim().is_empty() {
        None
    } else {
        Some(val)
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u64> {
    let n: u64 = value
        .parse()
        .with_context(|| format!("{} must be a number", key))?;
    if n == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(n)
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bookmirror")
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "BOOKMIRROR_DATA_DIR",
        "BOOKMIRROR_API_URL",
        "BOOKMIRROR_ACCESS_TOKEN",
        "BOOKMIRROR_BACKEND",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.api_url.is_none());
        assert!(config.credentials().is_none());
        assert_eq!(config.backend, Backend::Flat);
        assert!(config.data_dir.ends_with("bookmirror"));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("BOOKMIRROR_DATA_DIR", "/tmp/bookmirror-test");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/bookmirror-test"));
    }

    #[test]
    fn test_env_override_api_url_and_token() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("BOOKMIRROR_API_URL", "http://localhost:8080");
        env::set_var("BOOKMIRROR_ACCESS_TOKEN", "tok");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.credentials(), Some(Credentials::new("tok")));

        // Empty string clears it
        env::set_var("BOOKMIRROR_ACCESS_TOKEN", "");
        config.apply_env_overrides().unwrap();
        assert!(config.access_token.is_none());
    }

    #[test]
    fn test_env_override_backend() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("BOOKMIRROR_BACKEND", "nested");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.backend, Backend::Nested);

        env::set_var("BOOKMIRROR_BACKEND", "sideways");
        assert!(config.apply_env_overrides().is_err());
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            api_url = "https://mirror.example.com"
            backend = "nested"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.api_url.as_deref(), Some("https://mirror.example.com"));
        assert_eq!(config.backend, Backend::Nested);
        // Unspecified fields keep their defaults
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_timing_keys_in_file_are_ignored() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            api_url = "https://mirror.example.com"
            poll_interval_ms = 1
            poll_max_attempts = 1
            queue_delay_ms = 0
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.api_url.as_deref(), Some("https://mirror.example.com"));
        let saved = toml::to_string(&config).unwrap();
        assert!(!saved.contains("poll_interval_ms"));
        assert!(!saved.contains("queue_delay_ms"));
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config::load_from_path(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("api_url", "http://books.local").unwrap();
        config.set("access_token", "abc").unwrap();
        config.set("backend", "nested").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = Config::default();
        assert!(config.set("colour", "blue").is_err());
        assert!(config.set("request_timeout_secs", "soon").is_err());
        assert!(config.set("request_timeout_secs", "0").is_err());
        assert!(config.set("backend", "tree").is_err());

        // Poll and queue timings are fixed, not settable
        for key in ["poll_interval_ms", "poll_max_attempts", "queue_delay_ms"] {
            assert!(config.set(key, "1").is_err(), "{} accepted", key);
        }

        config.set("log_file", "").unwrap();
        assert!(config.log_file.is_none());
    }
}
