//! Configuration file support for uartstress.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (UARTSTRESS_*)
//! 3. Local config file (./uartstress.toml)
//! 4. Global config file (~/.config/uartstress/config.toml)
//!
//! ```toml
//! [connection]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//!
//! [test]
//! count = 10
//! size = 256
//! timeout_ms = 2000
//! poll_ms = 100
//! byte_order = "little"
//! write_all = false
//! ```

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uartstress::ResponseByteOrder;

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = "uartstress.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
}

/// Stress test defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Number of iterations.
    pub count: Option<usize>,
    /// Payload size in bytes.
    pub size: Option<usize>,
    /// Base response timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Poll interval in milliseconds.
    pub poll_ms: Option<u64>,
    /// Byte order of the device's checksum.
    pub byte_order: Option<ResponseByteOrder>,
    /// Keep writing until the whole payload is accepted.
    #[serde(default)]
    pub write_all: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Test settings.
    #[serde(default)]
    pub test: TestConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "uartstress").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one. Values set in `other` win.
    fn merge(&mut self, other: Self) {
        let Self { connection, test } = other;

        if connection.port.is_some() {
            self.connection.port = connection.port;
        }
        if connection.baud.is_some() {
            self.connection.baud = connection.baud;
        }

        if test.count.is_some() {
            self.test.count = test.count;
        }
        if test.size.is_some() {
            self.test.size = test.size;
        }
        if test.timeout_ms.is_some() {
            self.test.timeout_ms = test.timeout_ms;
        }
        if test.poll_ms.is_some() {
            self.test.poll_ms = test.poll_ms;
        }
        if test.byte_order.is_some() {
            self.test.byte_order = test.byte_order;
        }
        if test.write_all {
            self.test.write_all = true;
        }
    }
}
