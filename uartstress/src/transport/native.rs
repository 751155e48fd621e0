//! Native serial transport implementation using the `serialport` crate.
//!
//! The OS handle type is fixed at build time: a termios-backed `TTYPort` on
//! unix (the backend uses the `termios2` ioctl path on Linux, so arbitrary baud
//! rates are accepted) and a Win32 `COMPort` on Windows.
//!
//! Exclusive access is enforced by the backend when the port is opened:
//!
//! - **unix**: `TIOCEXCL` on the tty plus a non-blocking exclusive `flock`,
//!   which also keeps privileged processes off the device. Both are released
//!   with the descriptor.
//! - **Windows**: COM handles are opened without sharing, so a second opener
//!   is refused by the OS.
//!
//! The handle timeout bounds reads. Writes widen it for the duration of the
//! call so the driver never cuts a payload short while it is still on the wire.

use {
    crate::{
        error::{Error, Result},
        transport::{PortInfo, SerialSettings, Transport},
    },
    log::{debug, info, trace},
    serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort as _, StopBits},
    std::io::{self, Read as _, Write as _},
};

#[cfg(unix)]
type NativeHandle = serialport::TTYPort;

#[cfg(windows)]
type NativeHandle = serialport::COMPort;

/// Serial transport over an OS serial device.
///
/// The handle is owned exclusively and released on [`close`](Transport::close)
/// or drop, whichever comes first.
pub struct NativeTransport {
    settings: SerialSettings,
    device_path: String,
    handle: Option<NativeHandle>,
}

impl NativeTransport {
    /// Create a closed transport for the given settings.
    pub fn new(settings: SerialSettings) -> Self {
        let device_path = settings.device_path();
        Self {
            settings,
            device_path,
            handle: None,
        }
    }

    /// Create a closed transport with the default read timeout.
    pub fn with_port(port_name: &str, baud_rate: u32) -> Self {
        Self::new(SerialSettings::new(port_name, baud_rate))
    }

    /// Path handed to the OS when opening.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Transport settings.
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Open and configure the device, taking exclusive access.
    fn acquire(&self) -> Result<NativeHandle> {
        let port = &self.settings.port_name;

        serialport::new(&self.device_path, self.settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.settings.read_timeout)
            .open_native()
            .map_err(|e| Error::from_open_failure(port, e, device_node_exists(&self.device_path)))
    }
}

/// Whether the device node is present, used to tell a held device from a
/// missing one when the backend reports both as `NoDevice`.
#[cfg(unix)]
fn device_node_exists(path: &str) -> bool {
    std::path::Path::new(path).exists()
}

/// COM ports have no filesystem node; Windows reports contention as access
/// denied instead.
#[cfg(windows)]
fn device_node_exists(_path: &str) -> bool {
    false
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl Transport for NativeTransport {
    fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            self.clear();
            return Ok(());
        }

        debug!(
            "Opening {} ({}) at {} baud",
            self.settings.port_name, self.device_path, self.settings.baud_rate
        );
        let handle = self.acquire()?;
        self.handle = Some(handle);
        self.clear();
        info!(
            "Opened {} at {} baud, 8N1, no flow control",
            self.settings.port_name, self.settings.baud_rate
        );
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let Some(handle) = self.handle.as_mut() else {
            return 0;
        };
        match handle.read(buf) {
            Ok(n) => n,
            Err(e) if is_transient(&e) => 0,
            Err(e) => {
                trace!("Read error on {} (ignoring): {e}", self.settings.port_name);
                0
            },
        }
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let write_timeout = self
            .settings
            .write_timeout(data.len());
        let read_timeout = self.settings.read_timeout;
        let Some(handle) = self.handle.as_mut() else {
            return 0;
        };

        if let Err(e) = handle.set_timeout(write_timeout) {
            trace!("Setting write timeout on {} failed: {e}", self.settings.port_name);
        }
        let result = handle.write(data);
        if let Err(e) = handle.set_timeout(read_timeout) {
            trace!("Restoring read timeout on {} failed: {e}", self.settings.port_name);
        }

        match result {
            Ok(n) => n,
            Err(e) if is_transient(&e) => 0,
            Err(e) => {
                trace!("Write error on {} (ignoring): {e}", self.settings.port_name);
                0
            },
        }
    }

    fn clear(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.clear(ClearBuffer::All) {
                trace!("Clear failed on {} (ignoring): {e}", self.settings.port_name);
            }
        }
    }

    fn close(&mut self) {
        // Dropping the handle closes the descriptor and releases the lock.
        if self
            .handle
            .take()
            .is_some()
        {
            debug!("Closed {}", self.settings.port_name);
        }
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn port_name(&self) -> &str {
        &self.settings.port_name
    }

    fn baud_rate(&self) -> u32 {
        self.settings.baud_rate
    }
}

impl Drop for NativeTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// List the serial ports visible to the OS.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(Error::Serial)?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let (vid, pid, manufacturer, product, serial_number) = match &p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    Some(info.vid),
                    Some(info.pid),
                    info.manufacturer
                        .clone(),
                    info.product
                        .clone(),
                    info.serial_number
                        .clone(),
                ),
                _ => (None, None, None, None, None),
            };

            PortInfo {
                name: p.port_name,
                vid,
                pid,
                manufacturer,
                product,
                serial_number,
            }
        })
        .collect())
}
