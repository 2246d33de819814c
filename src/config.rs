//! Application-level configuration loading: listen port, storage backend and clock tuning.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::state::clock::ClockMode;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COURTSIDE_CONFIG_PATH";
/// Environment variable that overrides the configured port.
const PORT_ENV: &str = "PORT";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// TCP port the HTTP server binds to.
    pub port: u16,
    /// Which backend holds the scoreboards.
    pub store: StoreConfig,
    /// Local clock engine tuning.
    pub clock: ClockConfig,
    /// Capacity of each session's presentation event channel.
    pub event_capacity: usize,
}

/// Storage backend selection. Connection details come from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Backend kind.
    pub kind: StoreKind,
}

/// Supported storage backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Process-local store; sessions vanish with the process.
    #[default]
    Memory,
    /// CouchDB, configured through `COUCH_*` variables.
    CouchDb,
    /// MongoDB replica set, configured through `MONGO_*` variables.
    MongoDb,
}

/// Local clock engine settings.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClockConfig {
    /// Period of the clock engine.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "tickIntervalMs")]
    pub tick_interval: Duration,
    /// How often the host re-writes its replica, mutation or not.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "autosaveIntervalSecs")]
    pub autosave_interval: Duration,
    /// Shot clock value at or below which the low-shot-clock signal fires.
    pub low_shot_clock_threshold: u32,
    /// Tick-counted or deadline-based countdown.
    pub mode: ClockMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            store: StoreConfig::default(),
            clock: ClockConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            autosave_interval: Duration::from_secs(10),
            low_shot_clock_threshold: 5,
            mode: ClockMode::TickCounted,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        store = ?config.store.kind,
                        clock_mode = ?config.clock.mode,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config.with_port_override(env::var(PORT_ENV).ok().as_deref())
    }

    /// Parse a JSON document; absent fields keep their defaults and zero periods are
    /// replaced by them.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        let mut config: Self = serde_json::from_str(contents)?;
        config.clock = config.clock.with_positive_periods();
        Ok(config)
    }

    fn with_port_override(mut self, raw: Option<&str>) -> Self {
        if let Some(raw) = raw {
            match raw.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(err) => warn!(value = raw, error = %err, "ignoring invalid {PORT_ENV}"),
            }
        }
        self
    }
}

impl ClockConfig {
    fn with_positive_periods(mut self) -> Self {
        let defaults = Self::default();
        if self.tick_interval.is_zero() {
            warn!("tickIntervalMs must be positive; using the default");
            self.tick_interval = defaults.tick_interval;
        }
        if self.autosave_interval.is_zero() {
            warn!("autosaveIntervalSecs must be positive; using the default");
            self.autosave_interval = defaults.autosave_interval;
        }
        self
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
