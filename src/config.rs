use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the configuration file, looked up in the notes root.
pub const CONFIG_FILE_NAME: &str = "til.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DbConfig {
    /// SQLite file. Relative paths are resolved against the notes root.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            table: default_table(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tils.db")
}
fn default_table() -> String {
    "til".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SiteConfig {
    /// Prefix for every record's public `url`; the note path is appended as-is.
    #[serde(default)]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_ref", rename = "ref")]
    pub git_ref: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            git_ref: default_ref(),
        }
    }
}

fn default_ref() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RenderConfig {
    /// `remote` or `local`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            endpoint: default_endpoint(),
            token_env: default_token_env(),
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_strategy() -> String {
    "remote".to_string()
}
fn default_endpoint() -> String {
    "https://api.github.com/markdown".to_string()
}
fn default_token_env() -> String {
    "MARKDOWN_GITHUB_TOKEN".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_secs() -> u64 {
    60
}
fn default_timeout_secs() -> u64 {
    30
}

impl RenderConfig {
    /// Bearer token from the configured environment variable, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8001".to_string()
}

impl Config {
    /// Make relative paths absolute with respect to the notes root.
    pub fn resolve_paths(mut self, root: &Path) -> Self {
        if self.db.path.is_relative() {
            self.db.path = root.join(&self.db.path);
        }
        self
    }

    /// Public URL for a note at `path` (relative, `/`-separated).
    pub fn note_url(&self, path: &str) -> String {
        format!("{}{}", self.site.base_url, path)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    match config.render.strategy.as_str() {
        "remote" | "local" => {}
        other => bail!(
            "Unknown render strategy: '{}'. Must be remote or local.",
            other
        ),
    }

    if config.render.max_attempts == 0 {
        bail!("render.max_attempts must be >= 1");
    }

    if config.db.table.is_empty()
        || !config
            .db
            .table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        bail!("db.table must be a non-empty identifier of [A-Za-z0-9_]");
    }

    Ok(())
}

/// Write `config` to `path` as TOML.
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

/// Look up a dotted key such as `site.base_url`.
pub fn get_value(config: &Config, key: &str) -> Result<toml::Value> {
    let mut current = toml::Value::try_from(config)?;
    for part in key.split('.') {
        current = match current {
            toml::Value::Table(mut table) => table
                .remove(part)
                .ok_or_else(|| anyhow::anyhow!("Unknown config key: {}", key))?,
            _ => bail!("Unknown config key: {}", key),
        };
    }
    Ok(current)
}

/// Set a dotted key, keeping the value's existing type, and re-validate.
pub fn set_value(config: &Config, key: &str, raw: &str) -> Result<Config> {
    let mut root = toml::Value::try_from(config)?;
    let parts: Vec<&str> = key.split('.').collect();
    let (last, parents) = parts
        .split_last()
        .ok_or_else(|| anyhow::anyhow!("Empty config key"))?;

    let mut table = root
        .as_table_mut()
        .ok_or_else(|| anyhow::anyhow!("Config is not a table"))?;
    for part in parents {
        table = table
            .get_mut(*part)
            .and_then(|v| v.as_table_mut())
            .ok_or_else(|| anyhow::anyhow!("Unknown config key: {}", key))?;
    }

    let existing = table
        .get(*last)
        .ok_or_else(|| anyhow::anyhow!("Unknown config key: {}", key))?;
    let value = match existing {
        toml::Value::Integer(_) => toml::Value::Integer(
            raw.parse()
                .with_context(|| format!("{} expects an integer", key))?,
        ),
        toml::Value::Boolean(_) => toml::Value::Boolean(
            raw.parse()
                .with_context(|| format!("{} expects true or false", key))?,
        ),
        _ => toml::Value::String(raw.to_string()),
    };
    table.insert((*last).to_string(), value);

    let updated: Config = root.try_into()?;
    validate(&updated)?;
    Ok(updated)
}
