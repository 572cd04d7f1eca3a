//! YYC Audio command-line front end
//!
//! Connects to the YYC-DJ peripheral, streams loopback audio into it until
//! Ctrl-C, then disconnects. Operator lines go to stdout; diagnostics go to
//! the logger (`RUST_LOG`).

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use yyc_audio_lib::audio::{self, Backpressure};
use yyc_audio_lib::config::{Config, DEFAULT_CONFIG_FILE};
use yyc_audio_lib::protocol::{BtleplugTransport, DeviceController};
use yyc_audio_lib::report::{LogSink, Reporter};
use yyc_audio_lib::ShockSession;

#[derive(Parser, Debug)]
#[command(name = "yyc-audio", version, about)]
struct Cli {
    /// Configuration file (defaults to ./yyc-audio.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture source ID, see --list-sources
    #[arg(short, long)]
    source: Option<String>,

    /// Print available capture sources and exit
    #[arg(long)]
    list_sources: bool,

    /// Advertised name of the peripheral
    #[arg(long)]
    device_name: Option<String>,

    /// Seconds to scan before giving up (0 = forever)
    #[arg(long)]
    discovery_timeout: Option<u64>,

    /// Capture-to-peripheral handoff policy
    #[arg(long, value_enum)]
    backpressure: Option<Backpressure>,
}

/// Prints operator lines on stdout
struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn log_line(&self, line: &str) {
        println!("{}", line);
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::load(DEFAULT_CONFIG_FILE)?,
        None => Config::default(),
    };

    if let Some(source) = &cli.source {
        config.audio.source_id = Some(source.clone());
    }
    if let Some(policy) = cli.backpressure {
        config.audio.backpressure = policy;
    }
    if let Some(name) = &cli.device_name {
        config.device.name = name.clone();
    }
    if let Some(secs) = cli.discovery_timeout {
        config.device.discovery_timeout_secs = secs;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if cli.list_sources {
        for source in audio::list_sources()? {
            println!("{:<40} {}", source.id, source.name);
        }
        return Ok(());
    }

    let config = load_config(&cli)?;
    let reporter = Reporter::new(Arc::new(ConsoleSink));

    let transport = BtleplugTransport::first_adapter()
        .await
        .context("Bluetooth unavailable")?;
    let controller = Arc::new(DeviceController::new(
        Arc::new(transport),
        config.device,
        reporter.clone(),
    ));
    let mut session = ShockSession::new(controller, config.audio, reporter);

    session.start().await?;
    log::info!("Press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    session.shutdown().await?;

    let stats = session.state().stats;
    println!(
        "{} buffers: {} sent, {} skipped, {} failed, {} dropped",
        stats.buffers, stats.sent, stats.skipped, stats.failed, stats.dropped
    );
    if let Some((a, b)) = stats.last {
        println!(
            "Last levels: LF: {}, LV: {}, RF: {}, RV: {}",
            a.frequency, a.strength, b.frequency, b.strength
        );
    }
    Ok(())
}
