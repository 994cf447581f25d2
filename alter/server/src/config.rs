//! Server configuration
//!
//! Settings resolve in priority order: CLI flags, then environment
//! variables, then an optional TOML file, then built-in defaults. The API
//! key is env-only (`GROQ_API_KEY` or `ALTER_API_KEY`) so it never ends up
//! committed inside a config file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::upstream::{
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_UPSTREAM_TIMEOUT, DEFAULT_UPSTREAM_URL,
};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Could not read the config file
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    /// Config file is not valid TOML
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Resolved server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: String,
    /// OpenAI-compatible completions endpoint
    pub upstream_url: String,
    /// Bearer key for the upstream, if configured
    pub api_key: Option<String>,
    /// Model name sent with every completion
    pub model: String,
    /// Completion token budget
    pub max_tokens: u32,
    /// Timeout on the upstream call
    pub upstream_timeout: Duration,
    /// Per-client request quota per minute
    pub rate_limit_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8750".to_string(),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            rate_limit_per_minute: 20,
        }
    }
}

/// On-disk shape: every field optional so partial files work
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Address to listen on
    pub bind: Option<String>,
    /// Completions endpoint
    pub upstream_url: Option<String>,
    /// Model name
    pub model: Option<String>,
    /// Completion token budget
    pub max_tokens: Option<u32>,
    /// Upstream timeout in milliseconds
    pub upstream_timeout_ms: Option<u64>,
    /// Per-client request quota per minute
    pub rate_limit_per_minute: Option<u32>,
}

/// Overrides supplied on the command line
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Address to listen on
    pub bind: Option<String>,
    /// Completions endpoint
    pub upstream_url: Option<String>,
    /// Model name
    pub model: Option<String>,
}

impl ServerConfig {
    /// Resolve configuration from an optional file plus env and CLI layers
    pub fn load(
        file: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = file {
            let raw = std::fs::read_to_string(path)?;
            let toml: ServerToml = toml::from_str(&raw)?;
            config.apply_toml(toml);
            tracing::debug!(path = %path.display(), "loaded config file");
        }

        config.apply_env();
        config.apply_overrides(overrides);
        Ok(config)
    }

    fn apply_toml(&mut self, toml: ServerToml) {
        if let Some(bind) = toml.bind {
            self.bind = bind;
        }
        if let Some(url) = toml.upstream_url {
            self.upstream_url = url;
        }
        if let Some(model) = toml.model {
            self.model = model;
        }
        if let Some(max_tokens) = toml.max_tokens {
            self.max_tokens = max_tokens;
        }
        if let Some(ms) = toml.upstream_timeout_ms {
            self.upstream_timeout = Duration::from_millis(ms);
        }
        if let Some(quota) = toml.rate_limit_per_minute {
            self.rate_limit_per_minute = quota;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("ALTER_BIND") {
            self.bind = bind;
        }
        if let Ok(url) = std::env::var("ALTER_UPSTREAM_URL") {
            self.upstream_url = url;
        }
        if let Ok(model) = std::env::var("ALTER_MODEL") {
            self.model = model;
        }
        if let Ok(quota) = std::env::var("ALTER_RATE_LIMIT_PER_MINUTE") {
            if let Ok(quota) = quota.parse() {
                self.rate_limit_per_minute = quota;
            }
        }
        if let Ok(key) = std::env::var("GROQ_API_KEY").or_else(|_| std::env::var("ALTER_API_KEY")) {
            self.api_key = Some(key);
        }
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(bind) = &overrides.bind {
            self.bind = bind.clone();
        }
        if let Some(url) = &overrides.upstream_url {
            self.upstream_url = url.clone();
        }
        if let Some(model) = &overrides.model {
            self.model = model.clone();
        }
    }
}
