//! Serial transport capability.
//!
//! Serial support depends on a platform driver, so it is injected
//! rather than assumed: the broadcaster and receiver take an optional
//! [`SerialBackend`]. Without one, asking for a serial endpoint is a
//! configuration error raised before any I/O starts.
//!
//! With the `serial` feature (default) [`SystemSerial`] opens real
//! ports through the `serialport` crate.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Baud rate used when none is configured.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read/write timeout applied to opened ports. Reads that time out are
/// treated as empty reads by the receiver.
pub const SERIAL_TIMEOUT: Duration = Duration::from_millis(10);

// ── SerialConfig ─────────────────────────────────────────────────

/// Serial endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,
    pub baud_rate: u32,
}

impl SerialConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

// ── Capability traits ────────────────────────────────────────────

/// An open serial byte stream.
pub trait SerialLink: Read + Write + Send {}

impl<T: Read + Write + Send> SerialLink for T {}

/// Opens serial links. Implemented only where a driver exists.
pub trait SerialBackend: Send + Sync {
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn SerialLink>>;
}

/// Shared handle to a backend.
pub type SharedSerialBackend = Arc<dyn SerialBackend>;

/// The backend compiled into this build, if any.
pub fn system_backend() -> Option<SharedSerialBackend> {
    #[cfg(feature = "serial")]
    {
        Some(Arc::new(SystemSerial))
    }
    #[cfg(not(feature = "serial"))]
    {
        None
    }
}

// ── SystemSerial ─────────────────────────────────────────────────

/// Serial ports through the `serialport` crate (8N1, no flow control).
#[cfg(feature = "serial")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerial;

#[cfg(feature = "serial")]
impl SerialBackend for SystemSerial {
    fn open(&self, config: &SerialConfig) -> Result<Box<dyn SerialLink>> {
        use serialport::{DataBits, FlowControl, Parity, StopBits};

        let port = serialport::new(&config.path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(SERIAL_TIMEOUT)
            .open()?;

        tracing::info!("opened serial port {} at {} baud", config.path, config.baud_rate);
        Ok(Box::new(port))
    }
}

// ── Tests ────────────────────────────────────────────────────────
