//! Configuration management for Trawl.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/trawl/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General application settings
    pub general: GeneralConfig,
    /// HTTP browser settings
    pub browser: BrowserConfig,
    /// Login and two-factor settings
    pub auth: AuthConfig,
    /// Multi-backend dispatch settings
    pub dispatch: DispatchConfig,
}

impl AppConfig {
    /// Load configuration from the default path, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, falling back to defaults if missing.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `TRAWL_TIMEOUT_SECS`: Override the HTTP timeout
    /// - `TRAWL_POLL_INTERVAL_SECS`: Override the app-validation poll interval
    /// - `TRAWL_POLL_TIMEOUT_SECS`: Override the app-validation poll budget
    /// - `TRAWL_MAX_CONCURRENT_BACKENDS`: Override dispatch concurrency
    /// - `TRAWL_NON_INTERACTIVE`: Disable prompting (true/false)
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides read through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("TRAWL_TIMEOUT_SECS") {
            match val.parse() {
                Ok(secs) => {
                    self.browser.timeout_secs = secs;
                    tracing::debug!("Override browser.timeout_secs from env: {}", secs);
                }
                Err(_) => tracing::warn!("Ignoring invalid TRAWL_TIMEOUT_SECS: {}", val),
            }
        }

        if let Some(val) = lookup("TRAWL_POLL_INTERVAL_SECS") {
            match val.parse() {
                Ok(secs) => {
                    self.auth.poll_interval_secs = secs;
                    tracing::debug!("Override auth.poll_interval_secs from env: {}", secs);
                }
                Err(_) => tracing::warn!("Ignoring invalid TRAWL_POLL_INTERVAL_SECS: {}", val),
            }
        }

        if let Some(val) = lookup("TRAWL_POLL_TIMEOUT_SECS") {
            match val.parse() {
                Ok(secs) => {
                    self.auth.poll_timeout_secs = secs;
                    tracing::debug!("Override auth.poll_timeout_secs from env: {}", secs);
                }
                Err(_) => tracing::warn!("Ignoring invalid TRAWL_POLL_TIMEOUT_SECS: {}", val),
            }
        }

        if let Some(val) = lookup("TRAWL_MAX_CONCURRENT_BACKENDS") {
            match val.parse() {
                Ok(max) => {
                    self.dispatch.max_concurrent_backends = max;
                    tracing::debug!("Override dispatch.max_concurrent_backends from env: {}", max);
                }
                Err(_) => {
                    tracing::warn!("Ignoring invalid TRAWL_MAX_CONCURRENT_BACKENDS: {}", val);
                }
            }
        }

        if let Some(val) = lookup("TRAWL_NON_INTERACTIVE") {
            match val.parse::<bool>() {
                Ok(non_interactive) => {
                    self.general.interactive = !non_interactive;
                    tracing::debug!("Override general.interactive from env: {}", !non_interactive);
                }
                Err(_) => tracing::warn!("Ignoring invalid TRAWL_NON_INTERACTIVE: {}", val),
            }
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.auth.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "auth.poll_interval_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.auth.poll_timeout_secs < self.auth.poll_interval_secs {
            return Err(ConfigError::InvalidValue {
                field: "auth.poll_timeout_secs".to_string(),
                reason: "must not be shorter than the poll interval".to_string(),
            });
        }
        if self.auth.otp_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "auth.otp_max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.dispatch.max_concurrent_backends == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dispatch.max_concurrent_backends".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Save configuration to the given path.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let config_dir = path.parent().ok_or_else(|| ConfigError::InvalidValue {
            field: "config_path".to_string(),
            reason: "no parent directory".to_string(),
        })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/trawl/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Get the path to the backends file.
    ///
    /// `general.backends_file` wins over the XDG default
    /// `~/.config/trawl/backends.toml`.
    pub fn backends_path(&self) -> ConfigResult<PathBuf> {
        match &self.general.backends_file {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.config_dir().join("backends.toml")),
        }
    }

    /// Get the directory holding persisted backend states.
    ///
    /// Uses XDG base directories: `~/.local/share/trawl/states`
    pub fn states_dir() -> ConfigResult<PathBuf> {
        Ok(project_dirs()?.data_dir().join("states"))
    }
}

fn project_dirs() -> ConfigResult<ProjectDirs> {
    ProjectDirs::from("org", "trawl", "trawl").ok_or(ConfigError::NoConfigDir)
}

/// Output format for the command-line front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One human readable line per object
    #[default]
    Plain,
    /// One JSON object per line
    Json,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Prompt for OTP codes, CAPTCHA answers and confirmations
    pub interactive: bool,
    /// Default output format
    pub formatter: OutputFormat,
    /// Explicit backends file location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backends_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            interactive: true,
            formatter: OutputFormat::Plain,
            backends_file: None,
        }
    }
}

/// HTTP browser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries on transport failures for idempotent requests
    pub max_retries: u32,
    /// Maximum redirect hops followed by one navigation
    pub max_redirects: u32,
    /// User agent string
    pub user_agent: String,
    /// Lifetime of a persisted browser state (none = never expires)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_duration_minutes: Option<u64>,
    /// Allow redirects from HTTPS to plain HTTP
    pub allow_https_downgrade: bool,
}

impl BrowserConfig {
    /// Request timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 2,
            max_redirects: 10,
            user_agent: format!("trawl/{}", env!("CARGO_PKG_VERSION")),
            state_duration_minutes: None,
            allow_https_downgrade: false,
        }
    }
}

/// Login and two-factor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Interval between two decoupled-validation polls, in seconds
    pub poll_interval_secs: u64,
    /// Total decoupled-validation polling budget, in seconds
    pub poll_timeout_secs: u64,
    /// Wrong OTP codes accepted before the login flow gives up
    pub otp_max_attempts: u32,
}

impl AuthConfig {
    /// Poll interval as a `Duration`.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Poll budget as a `Duration`.
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            poll_timeout_secs: 600,
            otp_max_attempts: 3,
        }
    }
}

/// Multi-backend dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of backends called concurrently
    pub max_concurrent_backends: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_backends: 5,
        }
    }
}
