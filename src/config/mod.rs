//! Configuration file management
//!
//! Loads the TOML configuration and provides service settings.
//! Default config path: /etc/gestured/config.toml (`GESTURED_CONFIG` overrides)

use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    BUS_NAME, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, DEFAULT_IDLE_TIMEOUT_MS,
    DEFAULT_LIVENESS_CHECK_EVERY, DEFAULT_POLL_TIMEOUT_MS, DEFAULT_SEAT, INTERFACE, OBJECT_PATH,
};
use crate::gesture::LatentStopPolicy;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run loop timing
    pub service: ServiceConfig,
    /// Gesture forwarding
    pub gestures: GestureConfig,
    /// Input device settings
    pub input: InputConfig,
    /// Bus connection settings
    pub bus: BusConfig,
}

/// Run loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Exit after this long without a StayAlive call (ms)
    pub idle_timeout_ms: u64,
    /// Upper bound for one blocking wait (ms)
    pub poll_timeout_ms: u64,
    /// Check liveness once every N loop iterations (>= 1)
    pub liveness_check_every: u32,
}

/// Gesture forwarding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Forward pinch gestures (kind bytes 3..5)
    pub forward_pinch: bool,
    /// "per-event" | "per-batch"
    pub latent_stop: LatentStopPolicy,
}

/// Input device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// udev seat to assign the libinput context to
    pub seat: String,
}

/// Which message bus to connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    System,
    Session,
}

/// Bus connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// "system" | "session"
    pub bus: BusKind,
    /// Well-known name to request
    pub name: String,
    /// Object path signals are emitted from
    pub path: String,
    /// Interface of the StayAlive method and UpdateGesture signal
    pub interface: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            liveness_check_every: DEFAULT_LIVENESS_CHECK_EVERY,
        }
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            forward_pinch: true,
            latent_stop: LatentStopPolicy::default(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            seat: DEFAULT_SEAT.to_string(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bus: BusKind::System,
            name: BUS_NAME.to_string(),
            path: OBJECT_PATH.to_string(),
            interface: INTERFACE.to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Wait timeout for poll(2), saturated to its `int` argument
    pub fn poll_timeout_ms(&self) -> i32 {
        i32::try_from(self.poll_timeout_ms).unwrap_or(i32::MAX)
    }

    pub fn liveness_check_every(&self) -> u32 {
        self.liveness_check_every.max(1)
    }

    /// Worst-case delay between the deadline passing and the check noticing
    pub fn check_interval_ms(&self) -> u64 {
        self.poll_timeout_ms
            .saturating_mul(u64::from(self.liveness_check_every()))
    }
}

impl Config {
    /// Path that would be used for loading config.
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. GESTURED_CONFIG environment variable
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
            warn!("{} points to missing file: {}", CONFIG_PATH_ENV, path);
        }

        // 2. System config: /etc/gestured/config.toml
        let system_config = Path::new(DEFAULT_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. GESTURED_CONFIG environment variable
    /// 2. /etc/gestured/config.toml
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    config.warn_suspicious();
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {:#}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Strict validation for `--check-config`
    pub fn check(&self) -> Result<()> {
        if self.service.idle_timeout_ms == 0 {
            bail!("service.idle_timeout_ms must be greater than 0");
        }
        if self.input.seat.is_empty() {
            bail!("input.seat must not be empty");
        }
        if self.bus.name.is_empty() || self.bus.interface.is_empty() {
            bail!("bus.name and bus.interface must not be empty");
        }
        if !self.bus.path.starts_with('/') {
            bail!("bus.path must be an absolute object path, got {:?}", self.bus.path);
        }
        Ok(())
    }

    /// Log settings that are legal but probably not intended
    fn warn_suspicious(&self) {
        let service = &self.service;
        if service.liveness_check_every == 0 {
            warn!("service.liveness_check_every = 0, using 1");
        }
        if service.check_interval_ms() >= service.idle_timeout_ms {
            warn!(
                "Liveness checked every {}ms but idle timeout is {}ms; idle exit will lag",
                service.check_interval_ms(),
                service.idle_timeout_ms
            );
        }
    }
}
