//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/sketchroom/config.toml)
//! 3. Environment variables (SKETCHROOM_* prefix)
//!
//! Environment variables take precedence over config file values.
//! Command-line flags are applied on top by the CLI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::session::{BackoffPolicy, SessionConfig};

/// Environment variable prefix
const ENV_PREFIX: &str = "SKETCHROOM";

/// Keys accepted by [`Config::set_value`]
pub const CONFIG_KEYS: &[&str] = &[
    "display_name",
    "endpoints",
    "endpoint_override",
    "data_dir",
    "log_file",
    "announce_join",
    "connect_timeout_secs",
    "reconnect.base_delay_ms",
    "reconnect.growth_factor",
    "reconnect.max_delay_ms",
    "reconnect.max_jitter_ms",
    "reconnect.attempt_cap",
    "heartbeat.interval_secs",
    "heartbeat.timeout_secs",
];

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Name shown to other participants
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Relay endpoints, tried in rotation
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<Endpoint>,

    /// Pin all connection attempts to this endpoint
    #[serde(default)]
    pub endpoint_override: Option<Endpoint>,

    /// Directory for local data (debug log)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Debug log path, defaults to `<data_dir>/debug.log`
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Announce "<name> joined" after each connect
    #[serde(default = "default_true")]
    pub announce_join: bool,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

/// Reconnect backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub growth_factor: f64,
    pub max_delay_ms: u64,
    pub max_jitter_ms: u64,
    pub attempt_cap: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 3_000,
            growth_factor: 1.5,
            max_delay_ms: 30_000,
            max_jitter_ms: 1_000,
            attempt_cap: 10,
        }
    }
}

/// Heartbeat settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            endpoints: default_endpoints(),
            endpoint_override: None,
            data_dir: default_data_dir(),
            log_file: None,
            announce_join: true,
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (SKETCHROOM_NAME, SKETCHROOM_ENDPOINTS,
    ///    SKETCHROOM_ENDPOINT, SKETCHROOM_DATA_DIR)
    /// 2. Config file (~/.config/sketchroom/config.toml or SKETCHROOM_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from the `--config` path if given, otherwise the default location
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
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
        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("heartbeat.interval_secs", self.heartbeat.interval_secs),
            ("heartbeat.timeout_secs", self.heartbeat.timeout_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                bail!("{} must be greater than 0", key);
            }
        }
        if !self.reconnect.growth_factor.is_finite() || self.reconnect.growth_factor < 1.0 {
            bail!("reconnect.growth_factor must be at least 1.0");
        }
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // SKETCHROOM_NAME
        if let Ok(val) = std::env::var(format!("{}_NAME", ENV_PREFIX)) {
            if !val.trim().is_empty() {
                self.display_name = val;
            }
        }

        // SKETCHROOM_ENDPOINTS
        if let Ok(val) = std::env::var(format!("{}_ENDPOINTS", ENV_PREFIX)) {
            if !val.trim().is_empty() {
                self.endpoints = parse_endpoint_list(&val)
                    .with_context(|| format!("Invalid {}_ENDPOINTS", ENV_PREFIX))?;
            }
        }

        // SKETCHROOM_ENDPOINT
        if let Ok(val) = std::env::var(format!("{}_ENDPOINT", ENV_PREFIX)) {
            self.endpoint_override = parse_optional_endpoint(&val)
                .with_context(|| format!("Invalid {}_ENDPOINT", ENV_PREFIX))?;
        }

        // SKETCHROOM_DATA_DIR
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        Ok(())
    }

    /// Set a value by key, as `sketchroom config set` does
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "display_name" => {
                if value.trim().is_empty() {
                    bail!("display_name cannot be empty");
                }
                self.display_name = value.trim().to_string();
            }
            "endpoints" => {
                self.endpoints = parse_endpoint_list(value).context("Invalid endpoints")?;
            }
            "endpoint_override" => {
                self.endpoint_override =
                    parse_optional_endpoint(value).context("Invalid endpoint_override")?;
            }
            "data_dir" => self.data_dir = PathBuf::from(value),
            "log_file" => {
                self.log_file = if is_unset(value) {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "announce_join" => {
                self.announce_join = value
                    .parse()
                    .context("Invalid value for announce_join. Use 'true' or 'false'.")?;
            }
            "connect_timeout_secs" => self.connect_timeout_secs = parse_positive(key, value)?,
            "reconnect.base_delay_ms" => self.reconnect.base_delay_ms = parse_number(key, value)?,
            "reconnect.growth_factor" => {
                let factor: f64 = parse_number(key, value)?;
                if !factor.is_finite() || factor < 1.0 {
                    bail!("reconnect.growth_factor must be at least 1.0");
                }
                self.reconnect.growth_factor = factor;
            }
            "reconnect.max_delay_ms" => self.reconnect.max_delay_ms = parse_number(key, value)?,
            "reconnect.max_jitter_ms" => self.reconnect.max_jitter_ms = parse_number(key, value)?,
            "reconnect.attempt_cap" => self.reconnect.attempt_cap = parse_number(key, value)?,
            "heartbeat.interval_secs" => self.heartbeat.interval_secs = parse_positive(key, value)?,
            "heartbeat.timeout_secs" => self.heartbeat.timeout_secs = parse_positive(key, value)?,
            _ => {
                bail!(
                    "Unknown configuration key: '{}'\nValid keys: {}",
                    key,
                    CONFIG_KEYS.join(", ")
                );
            }
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with SKETCHROOM_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sketchroom")
            .join("config.toml")
    }

    /// Path of the debug log
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("debug.log"))
    }

    /// Ensure data directory exists
    pub fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Session settings derived from this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            display_name: self.display_name.clone(),
            endpoints: self.endpoints.clone(),
            endpoint_override: self.endpoint_override.clone(),
            backoff: BackoffPolicy {
                base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
                growth_factor: self.reconnect.growth_factor,
                max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
                max_jitter: Duration::from_millis(self.reconnect.max_jitter_ms),
                attempt_cap: self.reconnect.attempt_cap,
            },
            heartbeat_interval: Duration::from_secs(self.heartbeat.interval_secs),
            heartbeat_timeout: Duration::from_secs(self.heartbeat.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            announce_join: self.announce_join,
        }
    }
}

fn is_unset(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == "none"
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: '{}'", key, value))
}

fn parse_positive(key: &str, value: &str) -> Result<u64> {
    let number: u64 = parse_number(key, value)?;
    if number == 0 {
        bail!("{} must be greater than 0", key);
    }
    Ok(number)
}

/// Parse a comma-separated endpoint list
fn parse_endpoint_list(value: &str) -> Result<Vec<Endpoint>> {
    let endpoints = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Endpoint>().map_err(anyhow::Error::from))
        .collect::<Result<Vec<_>>>()?;

    if endpoints.is_empty() {
        bail!("at least one endpoint is required");
    }
    Ok(endpoints)
}

/// Parse an endpoint, where empty or "none" means unset
fn parse_optional_endpoint(value: &str) -> Result<Option<Endpoint>> {
    if is_unset(value) {
        return Ok(None);
    }
    Ok(Some(value.parse::<Endpoint>()?))
}

fn default_display_name() -> String {
    "Guest".to_string()
}

fn default_endpoints() -> Vec<Endpoint> {
    vec![Endpoint::default()]
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    10
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sketchroom")
}
