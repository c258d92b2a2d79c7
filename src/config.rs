//! Configuration loading.
//!
//! Loads `config.toml` from `--config`, `$TIANXING_CONFIG_PATH`, or
//! `~/.tianxing-chatbot/config.toml`. A missing file means defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::chat::tianxing::{self, ApiType, Endpoint};
use crate::chat::UuidSource;

/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "TIANXING_CONFIG_PATH";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Stable user identifier sent as `userid`.
    #[serde(default = "generate_uuid")]
    pub uuid: String,

    /// Chatbot spec, `"<name>:<config>"`, e.g. `"tianxing:your_api_key"`.
    #[serde(default)]
    pub chatbot: String,

    /// Tianxing endpoint settings.
    #[serde(default)]
    pub tianxing: TianxingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            uuid: generate_uuid(),
            chatbot: String::new(),
            tianxing: TianxingConfig::default(),
        }
    }
}

/// Tianxing endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TianxingConfig {
    /// API hostname.
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// API port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Initial API variant.
    #[serde(default)]
    pub api_type: ApiType,

    /// Pin the hostname to this address instead of resolving it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<IpAddr>,
}

impl Default for TianxingConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            api_type: ApiType::default(),
            address: None,
        }
    }
}

impl TianxingConfig {
    /// Endpoint the adapter talks to.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            hostname: self.hostname.clone(),
            port: self.port,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl UuidSource for Config {
    fn uuid(&self) -> String {
        self.uuid.clone()
    }
}

// Default value functions for serde

fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
fn default_hostname() -> String {
    tianxing::HOSTNAME.to_owned()
}
fn default_port() -> u16 {
    tianxing::DEFAULT_PORT
}
fn default_timeout_ms() -> u64 {
    5000
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be resolved, or the file exists
    /// but cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = config_path_with(explicit, |key| std::env::var(key).ok())?;
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a TOML file only, no env overrides. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Parse a TOML string. A blank `uuid` is replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid TOML or mistyped fields.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        let mut config: Self = toml::from_str(toml_str).context("failed to parse config TOML")?;
        if config.uuid.trim().is_empty() {
            config.uuid = generate_uuid();
        }
        Ok(config)
    }

    /// Serialise to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to serialise config")
    }

    /// Apply `TIANXING_*` overrides from an env lookup.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(chatbot) = env("TIANXING_CHATBOT") {
            self.chatbot = chatbot;
        }
        if let Some(uuid) = env("TIANXING_UUID").filter(|v| !v.trim().is_empty()) {
            self.uuid = uuid;
        }
        if let Some(hostname) = env("TIANXING_HOSTNAME").filter(|v| !v.trim().is_empty()) {
            self.tianxing.hostname = hostname;
        }
        if let Some(raw) = env("TIANXING_API_TYPE") {
            match raw.parse::<ApiType>() {
                Ok(api_type) => self.tianxing.api_type = api_type,
                Err(e) => tracing::warn!(error = %e, "ignoring TIANXING_API_TYPE"),
            }
        }
    }
}

/// Resolve the default config directory (`~/.tianxing-chatbot/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".tianxing-chatbot"))
}

/// Resolve the config file path: explicit > `$TIANXING_CONFIG_PATH` > default dir.
///
/// # Errors
///
/// Returns an error if the default directory is needed but cannot be resolved.
pub fn config_path_with(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env(CONFIG_PATH_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    Ok(config_dir()?.join("config.toml"))
}
