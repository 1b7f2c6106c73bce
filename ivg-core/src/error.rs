//! Domain-specific error types for the IVG stream.
//!
//! All fallible operations return `Result<T, IvgError>`.
//! Protocol damage on the receive side is never reported through this
//! type: extraction resynchronises instead. What remains are
//! configuration mistakes, bad input buffers and transport failures.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the IVG stream.
#[derive(Debug, Error)]
pub enum IvgError {
    // ── Configuration Errors ─────────────────────────────────────
    /// The receiver was given neither a TCP port nor a serial path.
    #[error("no endpoint configured: set either a TCP port or a serial path")]
    MissingEndpoint,

    /// The receiver was given both a TCP port and a serial path.
    #[error("conflicting endpoints: set exactly one of TCP port or serial path")]
    ConflictingEndpoints,

    /// Serial streaming was requested but no serial backend is available.
    #[error("serial streaming requested for {path} but no serial backend is available")]
    SerialUnavailable { path: String },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input Errors ─────────────────────────────────────────────
    /// The pixel buffer length does not match its declared layout.
    #[error("invalid pixel buffer: expected {expected} bytes, got {actual}")]
    InvalidPixelBuffer { expected: usize, actual: usize },

    /// Frame dimensions do not fit the 16-bit header fields.
    #[error("frame dimensions {width}x{height} exceed the 65535x65535 limit")]
    DimensionsTooLarge { width: u32, height: u32 },

    // ── Protocol Errors ──────────────────────────────────────────
    /// Bytes at a candidate frame start are not `0xA5 "IVG"`.
    #[error("invalid start sequence")]
    InvalidMagic,

    /// A header could not be unpacked.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial driver reported an error.
    #[error("serial error: {0}")]
    Serial(String),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// `start()` was called twice.
    #[error("already started")]
    AlreadyStarted,
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, IvgError>;

impl IvgError {
    /// Whether this error was raised before any I/O took place.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            IvgError::MissingEndpoint
                | IvgError::ConflictingEndpoints
                | IvgError::SerialUnavailable { .. }
                | IvgError::InvalidConfig(_)
        )
    }
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for IvgError {
    fn from(e: serialport::Error) -> Self {
        IvgError::Serial(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = IvgError::InvalidPixelBuffer {
            expected: 12,
            actual: 10,
        };
        assert!(e.to_string().contains("12"));
        assert!(e.to_string().contains("10"));

        let e = IvgError::SerialUnavailable {
            path: "/dev/ttyUSB0".into(),
        };
        assert!(e.to_string().contains("/dev/ttyUSB0"));
    }

    #[test]
    fn config_errors_are_classified() {
        assert!(IvgError::MissingEndpoint.is_config());
        assert!(IvgError::ConflictingEndpoints.is_config());
        assert!(!IvgError::AlreadyStarted.is_config());
        assert!(!IvgError::InvalidMagic.is_config());
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: IvgError = io_err.into();
        assert!(matches!(e, IvgError::Io(_)));
    }
}
