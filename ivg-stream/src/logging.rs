//! Tracing setup.
//!
//! The subscriber is installed before the config file is read so that
//! problems loading it are reported. It starts at `info` (or whatever
//! `RUST_LOG` says) and is narrowed to `[logging] level` once the
//! config is known. `RUST_LOG`, when set, always wins.

use tracing::Subscriber;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, reload};

/// Level used until the config file has been read.
pub const BOOTSTRAP_LEVEL: &str = "info";

/// Lets the filter be replaced after the subscriber is installed.
pub struct LogLevelHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    pinned: bool,
}

impl LogLevelHandle {
    /// Switch to `level` unless `RUST_LOG` fixed the filter.
    pub fn apply(&self, level: &str) -> Result<(), reload::Error> {
        if self.pinned {
            return Ok(());
        }
        self.handle.reload(EnvFilter::new(level))
    }
}

/// Build the process subscriber, honouring `RUST_LOG`.
pub fn bootstrap<W>(make_writer: W) -> (impl Subscriber + Send + Sync + 'static, LogLevelHandle)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    bootstrap_with(EnvFilter::try_from_default_env().ok(), make_writer)
}

fn bootstrap_with<W>(
    from_env: Option<EnvFilter>,
    make_writer: W,
) -> (impl Subscriber + Send + Sync + 'static, LogLevelHandle)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let pinned = from_env.is_some();
    let filter = from_env.unwrap_or_else(|| EnvFilter::new(BOOTSTRAP_LEVEL));
    let (filter, handle) = reload::Layer::new(filter);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(make_writer));
    (subscriber, LogLevelHandle { handle, pinned })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use crate::config::StreamToolConfig;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn invalid_config_warning_is_emitted() {
        let path = std::env::temp_dir().join(format!("ivg-stream-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[network\nport = ").unwrap();

        let capture = Capture::default();
        let writer = capture.clone();
        let (subscriber, levels) = bootstrap_with(None, move || writer.clone());
        let config = tracing::subscriber::with_default(subscriber, || {
            let config = StreamToolConfig::load(&path);
            levels.apply(&config.logging.level).unwrap();
            config
        });
        std::fs::remove_file(&path).ok();

        assert_eq!(config.network.port, 7331);
        let out = capture.text();
        assert!(out.contains("invalid config"), "captured: {out}");
        assert!(out.contains(&path.display().to_string()));
    }

    #[test]
    fn configured_level_replaces_bootstrap_level() {
        let capture = Capture::default();
        let writer = capture.clone();
        let (subscriber, levels) = bootstrap_with(None, move || writer.clone());
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("before reload");
            levels.apply("error").unwrap();
            tracing::warn!("after reload");
            tracing::error!("still shown");
        });

        let out = capture.text();
        assert!(out.contains("before reload"));
        assert!(!out.contains("after reload"));
        assert!(out.contains("still shown"));
    }

    #[test]
    fn env_filter_is_not_overridden() {
        let capture = Capture::default();
        let writer = capture.clone();
        let (subscriber, levels) =
            bootstrap_with(Some(EnvFilter::new("debug")), move || writer.clone());
        tracing::subscriber::with_default(subscriber, || {
            levels.apply("error").unwrap();
            tracing::debug!("kept by env");
        });

        assert!(capture.text().contains("kept by env"));
    }
}
