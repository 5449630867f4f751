//! TOML configuration.
//!
//! All commands read a single file (default `./config/catsync.toml`). The
//! engine API key may be supplied through `CATSYNC_ENGINE_API_KEY` instead of
//! the file so it never has to be committed.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `[engine].api_key`.
pub const API_KEY_ENV: &str = "CATSYNC_ENGINE_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub engine: EngineConfig,
    pub collection: CollectionConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    8108
}
fn default_protocol() -> String {
    "http".to_string()
}
fn default_timeout_secs() -> u64 {
    2
}

impl EngineConfig {
    /// Base URL of the engine, e.g. `http://localhost:8108`.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    pub name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_environment() -> String {
    "production".to_string()
}

impl CollectionConfig {
    /// Physical collection name, scoped by environment so staging and
    /// production never share documents or progress.
    pub fn scoped_name(&self) -> String {
        crate::schema::collection_name(&self.name, &self.environment)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            timezone: default_timezone(),
        }
    }
}

fn default_per_page() -> u32 {
    48
}
fn default_timezone() -> String {
    "UTC".to_string()
}

impl SearchConfig {
    /// Parse the configured IANA timezone.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| anyhow::anyhow!("search.timezone is not a valid IANA timezone: '{}'", self.timezone))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7341".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.is_empty() {
            config.engine.api_key = key;
        }
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.engine.host.trim().is_empty() {
        anyhow::bail!("engine.host must not be empty");
    }

    match config.engine.protocol.as_str() {
        "http" | "https" => {}
        other => anyhow::bail!(
            "Unknown engine protocol: '{}'. Must be http or https.",
            other
        ),
    }

    if config.engine.timeout_secs == 0 {
        anyhow::bail!("engine.timeout_secs must be > 0");
    }

    for (label, value) in [
        ("collection.name", &config.collection.name),
        ("collection.environment", &config.collection.environment),
    ] {
        if value.is_empty() {
            anyhow::bail!("{} must not be empty", label);
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            anyhow::bail!(
                "{} may only contain letters, digits, '_' and '-': '{}'",
                label,
                value
            );
        }
    }

    if config.indexing.batch_size == 0 {
        anyhow::bail!("indexing.batch_size must be > 0");
    }

    if config.search.per_page == 0 {
        anyhow::bail!("search.per_page must be > 0");
    }

    config.search.parse_timezone()?;

    Ok(())
}
