//! Configuration for the homegate gateway.
//!
//! A single TOML file layered under `HOMEGATE_*` environment overrides,
//! translated into `homegate_core::ServiceConfig`. Also installs the
//! `tracing` subscriber described by the `[logging]` section.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use homegate_core::config::DEFAULT_COMMISSIONING_WINDOW;
use homegate_core::{Readiness, ServiceConfig};

/// Prefix for environment overrides. Nested keys use `__`, e.g.
/// `HOMEGATE_SERVICE__COMMISSIONING_WINDOW_SECS=300`.
pub const ENV_PREFIX: &str = "HOMEGATE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServiceSection {
    #[serde(default = "default_true")]
    pub ready_for_device_operation: bool,

    #[serde(default = "default_true")]
    pub ready_for_pairing: bool,

    /// Commissioning window length used when a caller passes 0.
    #[serde(default = "default_commissioning_window_secs")]
    pub commissioning_window_secs: u64,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            ready_for_device_operation: true,
            ready_for_pairing: true,
            commissioning_window_secs: default_commissioning_window_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_commissioning_window_secs() -> u64 {
    DEFAULT_COMMISSIONING_WINDOW.as_secs()
}
fn default_filter() -> String {
    "info".into()
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.commissioning_window_secs == 0 {
            return Err(ConfigError::Validation {
                field: "service.commissioning_window_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if let Err(err) = EnvFilter::try_new(&self.logging.filter) {
            return Err(ConfigError::Validation {
                field: "logging.filter".into(),
                reason: err.to_string(),
            });
        }
        Ok(())
    }

    /// Translate into the core's runtime configuration.
    pub fn to_service_config(&self) -> ServiceConfig {
        ServiceConfig {
            readiness: Readiness {
                ready_for_device_operation: self.service.ready_for_device_operation,
                ready_for_pairing: self.service.ready_for_pairing,
            },
            default_commissioning_window: Duration::from_secs(self.service.commissioning_window_secs),
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "homegate", "homegate").map_or_else(
        || PathBuf::from("/etc/homegate/config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load defaults, then `path`, then `HOMEGATE_*` environment overrides.
/// A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    config.validate()?;
    Ok(config)
}

/// Load from the canonical config path.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config, falling back to defaults on any error.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parents.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    cfg.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Logging ─────────────────────────────────────────────────────────

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the
/// configured filter. Returns `false` if a subscriber was already set.
pub fn init_tracing(logging: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if logging.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
