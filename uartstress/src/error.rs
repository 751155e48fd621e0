//! Error types for uartstress.

use std::io;
use thiserror::Error;

/// Result type for uartstress operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for uartstress operations.
///
/// Only device acquisition and configuration can fail. Short or empty reads
/// and writes are reported as byte counts, and protocol failures are
/// per-iteration outcomes rather than errors.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error not covered by a more specific variant.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The device does not exist.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The device exists but the current user may not open it.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Another process holds the device.
    #[error("Device busy: {0} is in use by another application")]
    DeviceBusy(String),

    /// The device was opened but rejected the requested line settings.
    #[error("Configuration rejected by {port}: {reason}")]
    ConfigurationRejected {
        /// Port name as supplied by the caller.
        port: String,
        /// Backend description of the rejected setting.
        reason: String,
    },

    /// Invalid engine or transport configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if this error means the device could not be acquired.
    pub fn is_open_failure(&self) -> bool {
        match self {
            Self::DeviceNotFound(_)
            | Self::PermissionDenied(_)
            | Self::DeviceBusy(_)
            | Self::ConfigurationRejected { .. } => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            Self::Io(_) | Self::Config(_) => false,
        }
    }

    /// Classify a backend failure raised while opening `port`.
    ///
    /// The unix backend reports both a missing device and lock contention
    /// (`EBUSY`, a held `flock`) as `NoDevice`, so `device_exists` says whether
    /// the device node was present when the open failed.
    #[cfg(feature = "native")]
    pub fn from_open_failure(port: &str, err: serialport::Error, device_exists: bool) -> Self {
        use serialport::ErrorKind;

        let description = err
            .description
            .to_ascii_lowercase();
        if description.contains("busy") || description.contains("lock") {
            return Self::DeviceBusy(port.to_string());
        }

        match err.kind() {
            ErrorKind::NoDevice | ErrorKind::Io(io::ErrorKind::NotFound) if device_exists => {
                Self::DeviceBusy(port.to_string())
            },
            ErrorKind::NoDevice | ErrorKind::Io(io::ErrorKind::NotFound) => {
                Self::DeviceNotFound(port.to_string())
            },
            // Windows reports a COM port held by another process as access denied.
            ErrorKind::Io(io::ErrorKind::PermissionDenied) if cfg!(windows) => {
                Self::DeviceBusy(port.to_string())
            },
            ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
                Self::PermissionDenied(port.to_string())
            },
            ErrorKind::InvalidInput => Self::ConfigurationRejected {
                port: port.to_string(),
                reason: err.description,
            },
            _ => Self::Serial(err),
        }
    }
}
