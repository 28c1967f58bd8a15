//! Telemetry receiver for the serial radio link.
//!
//! Opens the configured serial port, reads newline-delimited telemetry and
//! prints every line with a UTC timestamp until Ctrl-C.

mod config;
mod configurator;
mod decoder;
mod logger;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use telemetry_serial::native::NativeResolver;
use telemetry_serial::{ChannelSubscriber, SerialDataSource, SourceEvent, SourceEvents};
use tracing::{debug, error, info, warn};

use crate::config::CliConfig;
use crate::configurator::PassthroughConfigurator;
use crate::decoder::LineDecoder;

#[derive(Debug, Parser)]
#[command(name = "telemetry-cli", version, about = "Receive telemetry over a serial link")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serial port to read from, overriding the config file
    #[arg(short, long, value_name = "NAME")]
    port: Option<String>,

    /// List the serial ports of this machine and exit
    #[arg(short, long)]
    list: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_cli_logger(cli.verbose);
    info!(version = telemetry_core::VERSION, "telemetry-cli starting");
    debug!(?cli, "Parsed command line");

    if cli.list {
        list_ports();
        return Ok(());
    }

    let config = CliConfig::load(cli.config.as_deref())?;
    let port_name = config.port_name(cli.port.as_deref())?;

    let resolver = NativeResolver::new();
    let source = Arc::new(SerialDataSource::with_config(
        port_name.clone(),
        config.source,
        resolver,
        PassthroughConfigurator,
        LineDecoder::default(),
    ));

    let (subscriber, events) = ChannelSubscriber::<Vec<String>>::new();
    source.subscribe(Arc::new(subscriber));

    // Opening may wait for the port; keep it off the async workers.
    let starting = source.clone();
    tokio::task::spawn_blocking(move || starting.start())
        .await
        .context("Start task failed")?
        .with_context(|| format!("Cannot start telemetry on {port_name}"))?;

    info!(port = %port_name, "Receiving telemetry, press Ctrl-C to stop");
    let outcome = receive(events).await;

    let stopping = source.clone();
    tokio::task::spawn_blocking(move || stopping.stop())
        .await
        .context("Stop task failed")?;
    info!(port = %port_name, "Telemetry stopped");

    outcome
}

/// Print events until Ctrl-C or until the source goes away.
async fn receive(mut events: SourceEvents<Vec<String>>) -> Result<()> {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Cannot listen for Ctrl-C")?;
                info!("Shutdown requested");
                return Ok(());
            }
            event = events.recv() => match event {
                Some(SourceEvent::Data(lines)) => {
                    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
                    for line in lines {
                        println!("{now} {line}");
                    }
                }
                Some(SourceEvent::Error(message)) => {
                    warn!(%message, "Telemetry read failed");
                }
                Some(other) => debug!(?other, "Ignoring event"),
                None => {
                    error!("Telemetry source closed unexpectedly");
                    return Ok(());
                }
            },
        }
    }
}

fn list_ports() {
    let ports = NativeResolver::available_ports();
    if ports.is_empty() {
        println!("No serial ports found");
        return;
    }
    for port in ports {
        println!("{port}");
    }
}
