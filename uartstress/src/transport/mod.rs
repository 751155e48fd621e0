//! Transport abstraction for raw serial byte streams.
//!
//! The stress engine talks to the device through the [`Transport`] trait,
//! which keeps the protocol logic independent of how bytes reach the wire:
//!
//! - **Native platforms** (Linux, macOS, Windows): [`NativeTransport`], backed
//!   by the `serialport` crate. The concrete OS handle type is chosen at build
//!   time (`TTYPort` on unix, `COMPort` on Windows).
//! - **Tests**: [`MockTransport`], which records writes and
//!   replays programmed responses.
//!
//! ```text
//! +------------------+
//! |   StressTest     |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |  Transport trait |
//! +--------+---------+
//!          |
//!    +-----+------+
//!    v            v
//! NativeTransport MockTransport
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use uartstress::transport::Transport;
//!
//! fn ping<T: Transport>(transport: &mut T) {
//!     transport.clear();
//!     let written = transport.write(b"\x01\x02\x03");
//!
//!     let mut buf = [0u8; 4];
//!     let n = transport.read(&mut buf);
//!     println!("wrote {written}, read {:?}", &buf[..n]);
//! }
//! ```

pub mod mock;
#[cfg(feature = "native")]
pub mod native;

use std::time::Duration;

use crate::error::Result;
use crate::stress::transmission_time;

/// Default per-call read timeout.
///
/// Reads must return quickly so the engine's poll loop, not the driver,
/// decides when to give up.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Serial line settings for a transport.
///
/// Framing is fixed at 8 data bits, no parity, 1 stop bit and no flow control;
/// only the port, baud rate and per-read timeout vary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Port name as supplied by the caller (e.g., "ttyUSB0", "/dev/ttyACM0", "COM3").
    pub port_name: String,
    /// Baud rate applied to both directions.
    pub baud_rate: u32,
    /// Upper bound for a single read call.
    pub read_timeout: Duration,
}

impl SerialSettings {
    /// Create settings with the default read timeout.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set the per-read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Timeout for a write of `len` bytes: the time they need on the wire plus
    /// the read timeout as slack. The driver must not give up on a write
    /// earlier than that.
    pub fn write_timeout(&self, len: usize) -> Duration {
        transmission_time(len, self.baud_rate) + self.read_timeout
    }

    /// Platform device path for the configured port name.
    pub fn device_path(&self) -> String {
        device_path(&self.port_name)
    }
}

/// Map a user-supplied port name onto the path the OS serial service expects.
///
/// On unix a bare device name such as `ttyUSB0` is looked up under `/dev`;
/// anything containing a `/` is taken as a path and left alone.
#[cfg(not(windows))]
pub fn device_path(port_name: &str) -> String {
    if port_name.contains('/') {
        port_name.to_string()
    } else {
        format!("/dev/{port_name}")
    }
}

/// Map a user-supplied port name onto the path the OS serial service expects.
///
/// The serial backend already opens COM ports through the `\\.\` device
/// namespace, so an explicit prefix from the user is stripped.
#[cfg(windows)]
pub fn device_path(port_name: &str) -> String {
    port_name
        .strip_prefix(r"\\.\")
        .unwrap_or(port_name)
        .to_string()
}

/// Serial port information.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Raw byte-stream access to a single serial device.
///
/// A transport starts closed. [`open`](Transport::open) acquires and fully
/// configures the device or leaves nothing behind. Reads and writes report
/// how many bytes moved; zero is a normal answer and not an error.
pub trait Transport {
    /// Acquire the device and configure raw 8-N-1 mode without flow control.
    ///
    /// On failure every partially acquired resource has been released and the
    /// transport is still closed.
    fn open(&mut self) -> Result<()>;

    /// Read whatever is available into `buf`, waiting at most the per-read
    /// timeout. Returns 0 when no data is available or the transport is closed.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Attempt a single write. Returns how many bytes the driver accepted,
    /// which may be fewer than `data.len()`.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Discard pending input and output. Does nothing when closed.
    fn clear(&mut self);

    /// Release the device. Safe to call repeatedly.
    fn close(&mut self);

    /// Whether the device is currently held.
    fn is_open(&self) -> bool;

    /// Port name as supplied by the caller, for diagnostics.
    fn port_name(&self) -> &str;

    /// Configured baud rate.
    fn baud_rate(&self) -> u32;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }

    fn write(&mut self, data: &[u8]) -> usize {
        (**self).write(data)
    }

    fn clear(&mut self) {
        (**self).clear();
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn port_name(&self) -> &str {
        (**self).port_name()
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }
}

pub use mock::{MockHandle, MockTransport};
#[cfg(feature = "native")]
pub use native::{NativeTransport, list_ports};
