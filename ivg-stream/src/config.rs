//! Configuration for the stream tool.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use ivg_core::stream::rle::DEFAULT_MONO_THRESHOLD;
use ivg_core::stream::serial::DEFAULT_BAUD_RATE;
use ivg_core::{BroadcasterConfig, ReceiverConfig, SerialConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToolConfig {
    /// TCP settings.
    pub network: NetworkConfig,
    /// Serial line settings.
    pub serial: SerialSection,
    /// Frame settings.
    pub stream: StreamSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// TCP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Port to serve on (`serve`) or connect to (`view`). 0 disables TCP.
    pub port: u16,
    /// Host to connect to in `view` mode.
    pub host: String,
    /// Interface to bind in `serve` mode.
    pub bind_addr: IpAddr,
    /// Per-subscriber write timeout in milliseconds.
    pub write_timeout_ms: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Serial line settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    /// Device path. Empty disables serial.
    pub path: String,
    pub baud_rate: u32,
}

/// Frame settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    /// Test pattern width in pixels.
    pub width: u32,
    /// Test pattern height in pixels.
    pub height: u32,
    /// Frames per second sent (`serve`) or polls per second (`view`).
    pub fps: u8,
    /// Send black/white frames.
    pub monochrome: bool,
    /// Gray level at or above which a pixel counts as white.
    pub threshold: u8,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: 7331,
            host: "127.0.0.1".into(),
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            write_timeout_ms: 2000,
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            fps: 30,
            monochrome: false,
            threshold: DEFAULT_MONO_THRESHOLD,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl StreamToolConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Frame interval derived from `stream.fps`.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.stream.fps.clamp(1, 120) as f64)
    }

    fn serial_config(&self) -> Option<SerialConfig> {
        (!self.serial.path.is_empty())
            .then(|| SerialConfig::new(&self.serial.path).with_baud_rate(self.serial.baud_rate))
    }

    /// Settings for `serve` mode.
    pub fn to_broadcaster_config(&self) -> BroadcasterConfig {
        BroadcasterConfig {
            port: (self.network.port != 0).then_some(self.network.port),
            bind_addr: self.network.bind_addr,
            serial: self.serial_config(),
            write_timeout: Duration::from_millis(self.network.write_timeout_ms.max(1)),
            monochrome: self.stream.monochrome.then_some(self.stream.threshold),
            ..BroadcasterConfig::default()
        }
    }

    /// Settings for `view` mode. A serial path takes the place of TCP.
    pub fn to_receiver_config(&self) -> ReceiverConfig {
        let serial = self.serial_config();
        ReceiverConfig {
            host: self.network.host.clone(),
            port: match serial {
                Some(_) => None,
                None => (self.network.port != 0).then_some(self.network.port),
            },
            serial,
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms.max(1)),
            ..ReceiverConfig::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
