//! MiTemp gateway - passive MiBeacon listener with scheduled GATT refresh.
//!
//! Run with: `cargo run -p mitemp-gw -- --config gateway.toml`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mitemp_core::ble::get_adapter;
use mitemp_core::{
    BroadcastListener, BtleLink, BtleScanner, Gateway, SensorHub, SensorLink, ScanControl,
};
use time::OffsetDateTime;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mitemp_gw::{Config, LogListener};

/// MiTemp gateway - Xiaomi thermometer BLE gateway.
#[derive(Parser, Debug)]
#[command(name = "mitemp-gw")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gateway in the foreground (default behavior).
    Run {
        /// Print every reported change as a JSON line on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration and list the configured devices.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = load_config(args.config.as_ref())?;

    match args.command {
        Some(Command::Check) => check(&config),
        Some(Command::Run { json }) => run(config, json).await,
        None => run(config, false).await,
    }
}

fn init_logging(verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("mitemp_core={}", level).parse()?)
                .add_directive(format!("mitemp_gw={}", level).parse()?),
        )
        .init();
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.validate()?;
    Ok(config)
}

fn check(config: &Config) -> anyhow::Result<()> {
    let registrations = config.registrations()?;
    println!("Configuration OK, {} devices", registrations.len());
    for registration in &registrations {
        let refresh = if registration.is_actively_polled() {
            format!("refresh every {}s", registration.refresh_interval.as_secs())
        } else {
            "passive".to_string()
        };
        println!(
            "  {} {} ({}, {})",
            registration.address,
            registration.display_name(),
            registration.model,
            refresh
        );
    }
    Ok(())
}

async fn run(config: Config, json: bool) -> anyhow::Result<()> {
    let registrations = config.registrations()?;
    if registrations.is_empty() {
        warn!("No devices configured, nothing will be reported");
    }

    let poller_options = config.scheduler.poller_options();
    poller_options.validate()?;
    let mut hub = SensorHub::new(poller_options);
    let now = OffsetDateTime::now_utc();
    for registration in registrations {
        hub.register(registration, now);
    }
    hub.add_listener(LogListener);

    if json {
        let broadcaster = BroadcastListener::default();
        let receiver = broadcaster.subscribe();
        hub.add_listener(broadcaster);
        tokio::spawn(print_events(receiver));
    }

    let adapter = get_adapter()
        .await
        .context("Bluetooth is required to run the gateway")?;

    let (adv_tx, adv_rx) = mpsc::channel(256);
    let (notify_tx, notify_rx) = mpsc::channel(16);
    let scanner = Arc::new(BtleScanner::new(adapter.clone(), config.scan.scan_options()));
    let link = Arc::new(BtleLink::new(
        adapter,
        config.link.link_options(),
        notify_tx,
    ));

    let cancel = CancellationToken::new();
    let scan_task = scanner.start(adv_tx, cancel.clone());

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
        }
        shutdown.cancel();
    });

    let gateway = Gateway::new(
        hub,
        Arc::clone(&scanner) as Arc<dyn ScanControl>,
        Arc::clone(&link) as Arc<dyn SensorLink>,
        config.scheduler.gateway_options(),
    );
    let hub = gateway.run(adv_rx, notify_rx, cancel).await;

    if let Err(e) = link.disconnect().await {
        warn!("Failed to disconnect: {}", e);
    }
    if let Err(e) = scan_task.await {
        warn!("Scanner task failed: {}", e);
    }

    for line in hub.status_report(OffsetDateTime::now_utc()).lines() {
        info!("{}", line);
    }
    Ok(())
}

async fn print_events(mut receiver: mitemp_core::EventReceiver) {
    loop {
        match receiver.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Dropped {} events", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
