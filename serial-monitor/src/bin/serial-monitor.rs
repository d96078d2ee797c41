//! Command-line line monitor.
//!
//! Connects to a serial port (by default through the RFC 2217 bridge at
//! `localhost:4000`), prints each received line to stdout, and stops on
//! Ctrl-C or SIGTERM. Diagnostics go to stderr; set `RUST_LOG` to adjust.

use anyhow::Result;
use clap::Parser;
use std::{io, time::Duration};
use tokio::signal::unix::{self, SignalKind};
use tokio_util::sync::CancellationToken;

use serial_monitor::{
    config::{self, MonitorConfig, SerialSettings},
    connection, monitor,
    tracing::{self, prelude::*},
    Endpoint,
};

/// Print lines received from a serial port
#[derive(Parser, Debug)]
#[command(name = "serial-monitor", version, about)]
struct Cli {
    /// rfc2217://host:port, host:port, or a local device path
    #[arg(short, long, env = "SERIAL_MONITOR_ADDRESS", default_value = config::DEFAULT_ADDRESS)]
    address: Endpoint,

    /// Serial link speed requested from the port
    #[arg(short, long, env = "SERIAL_MONITOR_BAUD", default_value_t = config::DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Seconds to wait for a complete line before trying again
    #[arg(
        short,
        long,
        env = "SERIAL_MONITOR_TIMEOUT",
        default_value = "1",
        value_parser = config::parse_seconds
    )]
    timeout: Duration,

    /// Seconds to wait for the TCP connection to the bridge
    #[arg(
        long,
        env = "SERIAL_MONITOR_CONNECT_TIMEOUT",
        default_value = "5",
        value_parser = config::parse_seconds
    )]
    connect_timeout: Duration,

    /// Seconds the bridge has to answer each handshake phase
    #[arg(
        long,
        env = "SERIAL_MONITOR_HANDSHAKE_TIMEOUT",
        default_value = "3",
        value_parser = config::parse_seconds
    )]
    handshake_timeout: Duration,
}

impl From<Cli> for MonitorConfig {
    fn from(cli: Cli) -> Self {
        Self {
            endpoint: cli.address,
            serial: SerialSettings::new(cli.baud),
            read_timeout: cli.timeout,
            connect_timeout: cli.connect_timeout,
            handshake_timeout: cli.handshake_timeout,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing::init_journald_or_stderr();

    let config = MonitorConfig::from(Cli::parse());
    config.validate()?;

    let connection = connection::open(&config).await?;
    info!("Started.");

    let running = CancellationToken::new();
    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let monitor = monitor::run(connection, running.clone(), &mut out);
    tokio::pin!(monitor);

    // The monitor and the signal streams share this one task; a signal only
    // flips the token, the monitor notices it at its next suspension point.
    let outcome = loop {
        tokio::select! {
            outcome = &mut monitor => break outcome,
            _ = sigint.recv() => {
                trace!("SIGINT received.");
                running.cancel();
            }
            _ = sigterm.recv() => {
                trace!("SIGTERM received.");
                running.cancel();
            }
        }
    };

    outcome?;
    info!("Exiting.");
    Ok(())
}
