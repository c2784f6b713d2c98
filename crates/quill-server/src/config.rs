//! Layered configuration: defaults, optional TOML file, then `QUILL__*` env.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "quill";
const ENV_PREFIX: &str = "QUILL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Include error source chains (`stack`) in HTTP error bodies.
    pub dev_mode: bool,
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub assistant: AssistantConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 41830,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Longest gap allowed between two backend events.
    pub idle_timeout_secs: u64,
    /// Longest a single stream may stay open.
    pub max_duration_secs: u64,
    /// Capacity of the backend -> relay event channel.
    pub channel_capacity: usize,
}

impl StreamConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            max_duration_secs: 300,
            channel_capacity: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Backend used when a request names no model.
    pub default_model: String,
    pub system_prompt: String,
    /// Pause between echoed words, in milliseconds.
    pub echo_delay_ms: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            default_model: "echo".to_string(),
            system_prompt: "You are a coding assistant embedded in a text editor. \
                Answer concisely and propose changes as unified diffs."
                .to_string(),
            echo_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. Entity updates are disabled when unset.
    pub database_path: Option<PathBuf>,
    /// Writable fields per table.
    pub tables: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Load configuration from `path` (or the default location) and the environment.
///
/// A missing file is not an error; defaults and environment still apply.
pub fn load(path: Option<&Path>) -> Result<AppConfig> {
    let config_file = match path {
        Some(path) if path.is_dir() => path.join("config.toml"),
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    load_from(&config_file)
}

fn load_from(config_file: &Path) -> Result<AppConfig> {
    let defaults = StreamConfig::default();
    let built = Config::builder()
        .set_default("logging.level", "info")?
        .set_default("stream.idle_timeout_secs", defaults.idle_timeout_secs as i64)?
        .set_default("stream.max_duration_secs", defaults.max_duration_secs as i64)?
        .add_source(
            File::from(config_file)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .with_context(|| format!("loading config from {}", config_file.display()))?;

    let config: AppConfig = built
        .try_deserialize()
        .context("deserializing configuration")?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    fn validate(&self) -> Result<()> {
        if self.stream.idle_timeout_secs == 0 || self.stream.max_duration_secs == 0 {
            return Err(anyhow!("stream timeouts must be greater than zero"));
        }
        if self.stream.channel_capacity == 0 {
            return Err(anyhow!("stream.channel_capacity must be greater than zero"));
        }
        if self.assistant.default_model.trim().is_empty() {
            return Err(anyhow!("assistant.default_model must not be empty"));
        }
        Ok(())
    }

    /// Render as TOML with a short header, for `quill config init`.
    pub fn to_toml(&self) -> Result<String> {
        let body = toml::to_string_pretty(self).context("serializing config to TOML")?;
        Ok(format!("# Configuration for {APP_NAME}\n\n{body}"))
    }
}

/// Write the default configuration to `path`, creating parent directories.
pub fn write_default(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }
    let body = AppConfig::default().to_toml()?;
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(default_config_dir()?.join("config.toml"))
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_NAME));
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_from(&dir.path().join("missing.toml")).unwrap();

        assert_eq!(config.stream.idle_timeout_secs, 60);
        assert_eq!(config.stream.max_duration_secs, 300);
        assert_eq!(config.assistant.default_model, "echo");
        assert_eq!(config.server.port, 41830);
        assert!(!config.dev_mode);
        assert!(config.store.database_path.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
dev_mode = true

[stream]
idle_timeout_secs = 5

[store]
database_path = "/tmp/quill.db"

[store.tables]
tasks = ["title", "done"]
"#,
        )
        .unwrap();

        let config = load(Some(path.as_path())).unwrap();
        assert!(config.dev_mode);
        assert_eq!(config.stream.idle_timeout_secs, 5);
        assert_eq!(config.stream.max_duration_secs, 300);
        assert_eq!(
            config.store.database_path.as_deref(),
            Some(Path::new("/tmp/quill.db"))
        );
        assert!(config.store.tables["tasks"].contains("done"));
    }

    #[test]
    fn test_directory_path_resolves_config_toml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.toml"), "[server]\nport = 9000\n").unwrap();

        let config = load(Some(dir.path())).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[stream]\nmax_duration_secs = 0\n").unwrap();

        assert!(load(Some(path.as_path())).is_err());
    }

    #[test]
    fn test_default_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        write_default(&path).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Configuration for quill"));

        let config = load(Some(path.as_path())).unwrap();
        assert_eq!(config.assistant.default_model, "echo");
    }
}
