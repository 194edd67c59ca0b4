//! Environment configuration for agent-trace.
//!
//! All settings come from `AGENT_TRACE_*` variables with built-in defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use agenttrace_core::{PricingError, PricingTable};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "AGENT_TRACE";

// ─────────────────────────────────────────────────────────────────────────────
// Error
// ─────────────────────────────────────────────────────────────────────────────

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid listen address: {0}")]
    InvalidAddr(String),

    #[error("Failed to load pricing: {0}")]
    Pricing(#[from] PricingError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// `text` selects the text formatter; anything else is JSON.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
    pub format: LogFormat,
}

impl LogConfig {
    fn parse_level(s: &str) -> String {
        let level = s.trim().to_ascii_lowercase();
        match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => level,
            "warning" => "warn".into(),
            _ => "info".into(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub env: String,
    /// Listen address; a bare `:port` binds all interfaces.
    pub port: String,
    pub db_path: PathBuf,
    pub log: LogConfig,
    pub request_timeout_ms: u64,
    pub pricing_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: "dev".into(),
            port: ":8080".into(),
            db_path: PathBuf::from("data/agent-trace.db"),
            log: LogConfig::default(),
            request_timeout_ms: 10_000,
            pricing_file: None,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a full variable name
    /// (e.g. `AGENT_TRACE_PORT`) to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}_{name}")).filter(|v| !v.trim().is_empty())
        };
        let mut cfg = Self::default();

        if let Some(v) = get("ENV") {
            cfg.env = v;
        }
        if let Some(v) = get("PORT") {
            cfg.port = v;
        }
        if let Some(v) = get("DB_PATH") {
            cfg.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            cfg.log.level = LogConfig::parse_level(&v);
        }
        if let Some(v) = get("LOG_FORMAT") {
            cfg.log.format = LogFormat::parse(&v);
        }
        if let Some(v) = get("REQUEST_TIMEOUT_MS") {
            cfg.request_timeout_ms = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}_REQUEST_TIMEOUT_MS"),
                value: v.clone(),
            })?;
        }
        if let Some(v) = get("PRICING_FILE") {
            cfg.pricing_file = Some(PathBuf::from(v));
        }

        Ok(cfg)
    }

    /// Socket address to bind.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = self.port.trim();
        let full = if raw.starts_with(':') {
            format!("0.0.0.0{raw}")
        } else if raw.chars().all(|c| c.is_ascii_digit()) {
            format!("0.0.0.0:{raw}")
        } else {
            raw.to_string()
        };
        full.parse().map_err(|_| ConfigError::InvalidAddr(self.port.clone()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The configured pricing file, or the built-in table.
    pub fn pricing_table(&self) -> Result<PricingTable, ConfigError> {
        match self.pricing_file {
            Some(ref path) => Ok(PricingTable::load(path)?),
            None => Ok(PricingTable::builtin()),
        }
    }
}
