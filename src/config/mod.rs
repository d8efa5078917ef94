//! Configuration loading.
//!
//! Loads configuration from `./config.toml` (or `$MUTANTWHATS_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::mutantwhats::adapter::{DEFAULT_DELAY_MS, DEFAULT_LOCAL_TIMEZONE};

/// Env var naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "MUTANTWHATS_CONFIG_PATH";

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Webhook server settings (`[server]`).
    pub server: ServerConfig,
    /// Identity the bot speaks as (`[bot]`).
    pub bot: BotConfig,
    /// Channel adapter behaviour (`[adapter]`).
    pub adapter: AdapterConfig,
    /// Log output (`[logging]`).
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$MUTANTWHATS_CONFIG_PATH` or `./config.toml`.
    /// If the file does not exist, returns defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using a custom env resolver (for testing).
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = config_path_with(&env);
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    /// Load from a TOML file only, no env overrides.
    fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
                    .with_context(|| format!("invalid config file {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids unsafe `set_var` in tests).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Adapter. `DEBUG` keeps its historical name.
        if let Some(v) = env("DEBUG") {
            self.adapter.debug = v == "true";
        }
        if let Some(v) = env("MUTANTWHATS_STRICT_DELIVERY") {
            match v.parse() {
                Ok(b) => self.adapter.strict_delivery = b,
                Err(_) => warn_invalid("MUTANTWHATS_STRICT_DELIVERY", &v),
            }
        }

        // Server.
        if let Some(v) = env("MUTANTWHATS_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = env("MUTANTWHATS_PORT") {
            match v.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn_invalid("MUTANTWHATS_PORT", &v),
            }
        }

        // Bot identity.
        if let Some(v) = env("MUTANTWHATS_BOT_ID") {
            self.bot.id = v;
        }
        if let Some(v) = env("MUTANTWHATS_BOT_NAME") {
            self.bot.name = v;
        }

        // Logging.
        if let Some(v) = env("MUTANTWHATS_LOG_DIR") {
            self.logging.dir = Some(v);
        }
    }

    /// Parse a TOML string into config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has mistyped fields.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }
}

/// Resolve the config path: `$MUTANTWHATS_CONFIG_PATH`, else `./config.toml`.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    env(CONFIG_PATH_ENV).map_or_else(|| PathBuf::from("config.toml"), PathBuf::from)
}

fn warn_invalid(var: &'static str, value: &str) {
    tracing::warn!(var, value, "ignoring invalid env override");
}

// ── Server config ───────────────────────────────────────────────

/// Webhook server settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    /// Listen port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3978,
        }
    }
}

// ── Bot config ──────────────────────────────────────────────────

/// Account the bot speaks as.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BotConfig {
    /// Bot account id.
    pub id: String,
    /// Bot display name.
    pub name: String,
    /// First message sent when a contact opens a conversation.
    pub greeting: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            id: "mutantwhats-bot".to_string(),
            name: "Bot".to_string(),
            greeting: "Hi! Send me a message and I'll repeat it.".to_string(),
        }
    }
}

// ── Adapter config ──────────────────────────────────────────────

/// Channel adapter behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Include request payloads in client logs.
    pub debug: bool,
    /// Timezone stamped on inbound activities.
    pub local_timezone: String,
    /// Stop an outbound batch on the first failed provider call.
    pub strict_delivery: bool,
    /// Pause for delay activities without a value, in milliseconds.
    pub default_delay_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            debug: false,
            local_timezone: DEFAULT_LOCAL_TIMEZONE.to_string(),
            strict_delivery: false,
            default_delay_ms: DEFAULT_DELAY_MS,
        }
    }
}

// ── Logging config ──────────────────────────────────────────────

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for rotated JSON logs; console only when unset.
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
