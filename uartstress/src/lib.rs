//! # uartstress
//!
//! A library for stress testing UART links.
//!
//! The host repeatedly sends random payloads to a device over a serial port
//! and checks that the device answers each one with the 32-bit wrapping sum of
//! the bytes it received. This exercises wiring, baud-rate configuration and
//! the device's receive/transmit path under load.
//!
//! This crate provides:
//!
//! - A raw serial [`Transport`] abstraction (8-N-1, no flow control, exclusive
//!   access) with a native backend and an in-memory mock
//! - Payload generation and the additive checksum
//! - The [`StressTest`] engine with adaptive response deadlines
//!
//! ## Supported Platforms
//!
//! - **Native** (default): Linux, macOS, Windows via the `serialport` crate
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for run summaries and settings
//!
//! ## Example
//!
//! ```rust,no_run
//! use uartstress::{StressConfig, StressTest};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let transport = uartstress::NativeTransport::with_port("/dev/ttyUSB0", 115200);
//!         let mut test = StressTest::new(transport, StressConfig::new(100, 3))?;
//!
//!         let summary = test.run(&mut |report| {
//!             println!("test {}: {}", report.index, report.outcome);
//!         })?;
//!         println!("{summary}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod payload;
pub mod stress;
pub mod transport;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use transport::{NativeTransport, list_ports};
pub use {
    error::{Error, Result},
    payload::{Payload, RESPONSE_LEN, ResponseByteOrder, checksum},
    stress::{
        FailReason, IterationReport, Outcome, RunSummary, StressConfig, StressTest, WriteMode,
        evaluate, transmission_time,
    },
    transport::{MockTransport, PortInfo, SerialSettings, Transport},
};
