//! Configuration using Figment.
//!
//! Settings are loaded from:
//! 1. `config/zio.toml` (or an explicit path)
//! 2. Environment variables prefixed with `ZIO_`, nested keys separated by
//!    a double underscore (`ZIO_PATHS__DEV_ROOT=/tmp/zio`)
//!
//! Every field has a default, so a missing file yields a working
//! configuration for a standard ZIO installation.
//!
//! # Example
//! ```no_run
//! use zio::config::ZioConfig;
//!
//! let config = ZioConfig::load()?;
//! config.validate()?;
//! println!("devices under {}", config.paths.sysfs_bus.display());
//! # Ok::<(), zio::ZioError>(())
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ZioError};
use crate::interface::Geometry;
use crate::logging::OutputFormat;

/// Config file read by [`ZioConfig::load`].
pub const DEFAULT_CONFIG_PATH: &str = "config/zio.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZioConfig {
    /// Filesystem locations
    pub paths: PathsConfig,
    /// Block acquisition settings
    pub acquisition: AcquisitionConfig,
    /// Logging settings
    pub logging: LogSettings,
}

/// Where the framework lives on this host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// ZIO bus directory in sysfs
    pub sysfs_bus: PathBuf,
    /// Directory holding the channel character devices
    pub dev_root: PathBuf,
}

/// Block acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Sample size used before any control record is read
    pub fallback_sample_size: u16,
    /// Sample count used before any control record is read
    pub fallback_sample_count: u32,
    /// Readiness wait timeout in milliseconds (negative waits forever)
    pub poll_timeout_ms: i64,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: OutputFormat,
}

fn default_sysfs_bus() -> PathBuf {
    PathBuf::from("/sys/bus/zio")
}

fn default_dev_root() -> PathBuf {
    PathBuf::from("/dev/zio")
}

fn default_poll_timeout() -> i64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sysfs_bus: default_sysfs_bus(),
            dev_root: default_dev_root(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            fallback_sample_size: Geometry::FALLBACK.sample_size,
            fallback_sample_count: Geometry::FALLBACK.sample_count,
            poll_timeout_ms: default_poll_timeout(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: OutputFormat::default(),
        }
    }
}

impl PathsConfig {
    /// `devices` directory under the bus.
    pub fn devices_dir(&self) -> PathBuf {
        self.sysfs_bus.join("devices")
    }
}

impl AcquisitionConfig {
    /// Geometry for data reads before any control record.
    pub fn fallback_geometry(&self) -> Geometry {
        Geometry {
            sample_size: self.fallback_sample_size,
            sample_count: self.fallback_sample_count,
        }
    }

    /// Wait timeout; `None` blocks indefinitely.
    pub fn poll_timeout(&self) -> Option<Duration> {
        u64::try_from(self.poll_timeout_ms)
            .ok()
            .map(Duration::from_millis)
    }
}

impl ZioConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ZIO_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ZioError::Config {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        if self.acquisition.fallback_sample_size == 0 || self.acquisition.fallback_sample_count == 0 {
            return Err(ZioError::Config {
                message: format!(
                    "Invalid fallback geometry {} x {}. Both must be non-zero",
                    self.acquisition.fallback_sample_size, self.acquisition.fallback_sample_count
                ),
            });
        }

        if self.paths.sysfs_bus.as_os_str().is_empty() || self.paths.dev_root.as_os_str().is_empty() {
            return Err(ZioError::Config {
                message: "sysfs_bus and dev_root must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
