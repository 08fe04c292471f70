//! Layered configuration: defaults, then the TOML file, then environment
//! variables prefixed `A2A_INSPECTOR__`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const APP_NAME: &str = "a2a-inspector";

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    /// Inspector backend the client talks to.
    pub server: ServerConfig,
    pub channel: ChannelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the inspector backend (http or https).
    pub base_url: String,
    /// Path of the capability-fetch endpoint.
    pub card_path: String,
    /// Path of the WebSocket channel endpoint.
    pub channel_path: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5001".to_string(),
            card_path: "/agent-card".to_string(),
            channel_path: "/ws".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// WebSocket URL of the channel: the base URL with its scheme switched to
    /// `ws`/`wss`, joined with `channel_path`.
    pub fn channel_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{}{}", ws_base, self.channel_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub max_reconnect_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 50,
            base_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

/// Load the configuration, writing a default file first if none exists.
///
/// With `dry_run` set, a missing file is reported but not created.
pub fn load_or_init_config(path: &Path, dry_run: bool) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        if dry_run {
            info!("dry-run: would create default config at {}", path.display());
        } else {
            write_default_config(path)?;
        }
    }
    load_config(path)
}

/// Load the configuration from `path` and the process environment.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    build_config(path, None)
}

fn build_config(
    path: &Path,
    env_source: Option<config::Map<String, String>>,
) -> Result<AppConfig, ConfigError> {
    let defaults = AppConfig::default();
    let built = Config::builder()
        .set_default("logging.level", defaults.logging.level)?
        .set_default("server.base_url", defaults.server.base_url)?
        .set_default("server.card_path", defaults.server.card_path)?
        .set_default("server.channel_path", defaults.server.channel_path)?
        .set_default(
            "server.request_timeout_secs",
            defaults.server.request_timeout_secs as i64,
        )?
        .set_default(
            "channel.max_reconnect_attempts",
            defaults.channel.max_reconnect_attempts as i64,
        )?
        .set_default("channel.base_backoff_ms", defaults.channel.base_backoff_ms as i64)?
        .set_default("channel.max_backoff_ms", defaults.channel.max_backoff_ms as i64)?
        .add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(&env_prefix())
                .separator("__")
                .try_parsing(true)
                .source(env_source),
        )
        .build()?;

    let mut config: AppConfig = built.try_deserialize()?;

    if let Some(ref file) = config.logging.file {
        let expanded = expand_str_path(file)?;
        config.logging.file = Some(expanded.display().to_string());
    }

    Ok(config)
}

/// Write the default configuration to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.display().to_string(),
            source,
        })?;
    }

    let toml = toml::to_string_pretty(&AppConfig::default())?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).map_err(|source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn default_config_header(path: &Path) -> String {
    format!(
        "# Configuration for {}\n# File: {}\n\n",
        APP_NAME,
        path.display()
    )
}

pub fn expand_str_path(text: &str) -> Result<PathBuf, ConfigError> {
    let expanded = shellexpand::full(text).map_err(|e| ConfigError::Expand {
        path: text.to_string(),
        message: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.to_string()))
}

/// Resolve the config file path: an explicit override (expanded), or the
/// default location under the XDG config directory.
pub fn resolve_config_path(override_path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match override_path {
        Some(path) => match path.to_str() {
            Some(text) => expand_str_path(text),
            None => Ok(path.to_path_buf()),
        },
        None => Ok(default_config_dir()?.join(CONFIG_FILE_NAME)),
    }
}

fn default_config_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_NAME));
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or(ConfigError::NoDirectory("configuration"))
}

/// Environment variable prefix, e.g. `A2A_INSPECTOR`.
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
