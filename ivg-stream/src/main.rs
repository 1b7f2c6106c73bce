//! ivg-stream entry point.
//!
//! ```text
//! ivg-stream serve                 Broadcast a test pattern
//! ivg-stream serve --bw            ...as black/white frames
//! ivg-stream view --port 7331      Decode a TCP stream
//! ivg-stream view --serial COM3    Decode a serial stream
//! ivg-stream --config <path>       Load a custom config TOML
//! ivg-stream --gen-config          Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::util::SubscriberInitExt;

use ivg_core::{StreamBroadcaster, StreamReceiver};
use ivg_stream::config::StreamToolConfig;
use ivg_stream::logging;
use ivg_stream::pattern::TestPattern;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ivg-stream", about = "IVG grayscale frame streaming tool")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "ivg-stream.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Broadcast a moving test pattern.
    Serve {
        /// TCP port to listen on (0 disables TCP).
        #[arg(short, long)]
        port: Option<u16>,
        /// Serial device to write frames to.
        #[arg(short, long)]
        serial: Option<String>,
        #[arg(short, long)]
        baud: Option<u32>,
        /// Send black/white frames.
        #[arg(long)]
        bw: bool,
    },
    /// Receive a stream and log decoded frames.
    View {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Serial device to read frames from.
        #[arg(short, long)]
        serial: Option<String>,
        #[arg(short, long)]
        baud: Option<u32>,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&StreamToolConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let Some(command) = cli.command else {
        eprintln!("no command given; try `ivg-stream serve` or `ivg-stream view`");
        std::process::exit(2);
    };

    // Logging comes up first so config problems are reported.
    let (subscriber, levels) = logging::bootstrap(std::io::stdout);
    subscriber.init();

    // Load config, then let flags override it.
    let mut config = StreamToolConfig::load(&cli.config);
    let serve = match command {
        Command::Serve {
            port,
            serial,
            baud,
            bw,
        } => {
            apply_overrides(&mut config, None, port, serial, baud);
            config.stream.monochrome |= bw;
            true
        }
        Command::View {
            host,
            port,
            serial,
            baud,
        } => {
            apply_overrides(&mut config, host, port, serial, baud);
            false
        }
    };

    levels.apply(&config.logging.level)?;

    info!("ivg-stream v{}", env!("CARGO_PKG_VERSION"));

    if serve {
        run_serve(config).await?;
    } else {
        run_view(config).await?;
    }
    Ok(())
}

fn apply_overrides(
    config: &mut StreamToolConfig,
    host: Option<String>,
    port: Option<u16>,
    serial: Option<String>,
    baud: Option<u32>,
) {
    if let Some(host) = host {
        config.network.host = host;
    }
    if let Some(port) = port {
        config.network.port = port;
    }
    if let Some(path) = serial {
        config.serial.path = path;
    }
    if let Some(baud) = baud {
        config.serial.baud_rate = baud;
    }
}

// ── Serve ────────────────────────────────────────────────────────

async fn run_serve(config: StreamToolConfig) -> ivg_core::Result<()> {
    let mut broadcaster = StreamBroadcaster::new(config.to_broadcaster_config());
    broadcaster.start().await?;

    match broadcaster.local_addr() {
        Some(addr) => info!("serving on {addr}"),
        None => info!("TCP disabled"),
    }
    if broadcaster.has_serial_sink() {
        info!(
            "writing to serial {} @ {} baud",
            config.serial.path, config.serial.baud_rate
        );
    }
    info!(
        "{}x{} @ {} fps{}",
        config.stream.width,
        config.stream.height,
        config.stream.fps,
        if config.stream.monochrome { " (bw)" } else { "" }
    );

    let mut pattern = TestPattern::new(config.stream.width, config.stream.height);
    let mut ticker = tokio::time::interval(config.frame_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            _ = ticker.tick() => {
                let frame = pattern.next_frame()?;
                match broadcaster.encode_and_broadcast(&frame).await {
                    Ok(report) if report.pruned > 0 => {
                        info!(
                            "frame {}: {} subscriber(s) dropped, {} remaining",
                            report.frame_id, report.pruned, report.delivered
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!("frame not sent: {e}"),
                }
            }
        }
    }

    broadcaster.stop().await;
    Ok(())
}

// ── View ─────────────────────────────────────────────────────────

async fn run_view(config: StreamToolConfig) -> ivg_core::Result<()> {
    let mut receiver = StreamReceiver::new(config.to_receiver_config());
    receiver.start().await?;
    info!("receiving");

    let mut ticker = tokio::time::interval(config.frame_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            _ = ticker.tick() => {
                for frame in receiver.poll() {
                    let total: u64 = frame.gray.iter().map(|&g| g as u64).sum();
                    let mean = total / frame.pixel_count().max(1) as u64;
                    info!(
                        "frame {} {}x{} mean luma {mean}",
                        frame.frame_id, frame.width, frame.height
                    );
                }
                if !receiver.is_alive() {
                    warn!("stream ended");
                    break;
                }
            }
        }
    }

    receiver.stop().await;
    Ok(())
}
