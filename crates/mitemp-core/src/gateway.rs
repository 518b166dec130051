//! The gateway event loop.
//!
//! One task owns the [`SensorHub`] and multiplexes everything that touches
//! it: advertisements from the scanner, notifications from the link, the
//! scheduler tick, the periodic status report and commands from
//! [`GatewayHandle`]s. Nothing else holds a reference to the hub, so no
//! locking is needed.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mitemp_core::{Gateway, GatewayOptions, SensorHub, PollerOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! let gateway = Gateway::new(hub, scanner, link, GatewayOptions::default());
//! let handle = gateway.handle();
//! let cancel = CancellationToken::new();
//! tokio::spawn(gateway.run(advertisements, notifications, cancel.clone()));
//!
//! let report = handle.status_report().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use mitemp_types::SensorValues;

use crate::error::{Error, Result};
use crate::freshness::deadline_after;
use crate::hub::SensorHub;
use crate::poller::TickOutcome;
use crate::registry::DeviceSelector;
use crate::traits::{Advertisement, ScanControl, SensorLink};

/// Longest ticker or report period; tokio timers panic past their horizon.
const LONGEST_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Event loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayOptions {
    /// How often the scheduler is advanced.
    pub tick_interval: Duration,
    /// How often the status report is logged. `None` disables it.
    pub report_interval: Option<Duration>,
    /// Capacity of the command channel.
    pub command_capacity: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            report_interval: Some(Duration::from_secs(60)),
            command_capacity: 16,
        }
    }
}

impl GatewayOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick interval.
    #[must_use]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set or disable the report interval.
    #[must_use]
    pub fn report_interval(mut self, interval: Option<Duration>) -> Self {
        self.report_interval = interval;
        self
    }
}

/// Wall clock anchored to the tokio clock.
///
/// Reads advance with `tokio::time`, so a paused runtime in tests also
/// pauses the gateway's notion of now.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    wall: OffsetDateTime,
    anchor: Instant,
}

impl Clock {
    /// Anchor a clock at the current time.
    pub fn new() -> Self {
        Self::starting_at(OffsetDateTime::now_utc())
    }

    /// Anchor a clock at `wall`.
    pub fn starting_at(wall: OffsetDateTime) -> Self {
        Self {
            wall,
            anchor: Instant::now(),
        }
    }

    /// Current time.
    pub fn now(&self) -> OffsetDateTime {
        deadline_after(self.wall, self.anchor.elapsed())
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

enum Command {
    Values(DeviceSelector, oneshot::Sender<Result<SensorValues>>),
    ForceRefresh(DeviceSelector, oneshot::Sender<Result<()>>),
    Report(oneshot::Sender<String>),
}

/// Cloneable handle for querying a running gateway.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Values(selector, _) => write!(f, "Values({})", selector),
            Command::ForceRefresh(selector, _) => write!(f, "ForceRefresh({})", selector),
            Command::Report(_) => f.write_str("Report"),
        }
    }
}

impl GatewayHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| Error::GatewayStopped)?;
        rx.await.map_err(|_| Error::GatewayStopped)
    }

    /// Current values of a device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`] for unknown devices and
    /// [`Error::GatewayStopped`] if the loop has exited.
    pub async fn values(&self, selector: impl Into<DeviceSelector>) -> Result<SensorValues> {
        let selector = selector.into();
        self.request(|reply| Command::Values(selector, reply))
            .await?
    }

    /// Make a device eligible for an active refresh on the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`] for unknown devices and
    /// [`Error::GatewayStopped`] if the loop has exited.
    pub async fn force_refresh(&self, selector: impl Into<DeviceSelector>) -> Result<()> {
        let selector = selector.into();
        self.request(|reply| Command::ForceRefresh(selector, reply))
            .await?
    }

    /// Status report of every device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GatewayStopped`] if the loop has exited.
    pub async fn status_report(&self) -> Result<String> {
        self.request(Command::Report).await
    }
}

/// Event loop owning a [`SensorHub`] and its radio collaborators.
pub struct Gateway {
    hub: SensorHub,
    scanner: Arc<dyn ScanControl>,
    link: Arc<dyn SensorLink>,
    options: GatewayOptions,
    clock: Clock,
    commands_tx: mpsc::Sender<Command>,
    commands_rx: mpsc::Receiver<Command>,
}

impl Gateway {
    /// Create a gateway.
    pub fn new(
        hub: SensorHub,
        scanner: Arc<dyn ScanControl>,
        link: Arc<dyn SensorLink>,
        options: GatewayOptions,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(options.command_capacity.max(1));
        Self {
            hub,
            scanner,
            link,
            options,
            clock: Clock::new(),
            commands_tx,
            commands_rx,
        }
    }

    /// Use a specific clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Get a handle for querying the running gateway.
    pub fn handle(&self) -> GatewayHandle {
        GatewayHandle {
            commands: self.commands_tx.clone(),
        }
    }

    /// Run until `cancel_token` is triggered, then return the hub.
    pub async fn run(
        mut self,
        mut advertisements: mpsc::Receiver<Advertisement>,
        mut notifications: mpsc::Receiver<Vec<u8>>,
        cancel_token: CancellationToken,
    ) -> SensorHub {
        info!(
            "Gateway started with {} devices",
            self.hub.registry().len()
        );

        let mut ticker = interval(self.options.tick_interval.min(LONGEST_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let report_period = self.options.report_interval;
        let mut reporter = interval(
            report_period
                .unwrap_or(Duration::from_secs(3600))
                .min(LONGEST_PERIOD),
        );
        reporter.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval fires immediately
        reporter.reset();

        // Drop our own sender so the command branch ends with the last handle
        let Self {
            mut hub,
            scanner,
            link,
            clock,
            commands_tx,
            mut commands_rx,
            ..
        } = self;
        drop(commands_tx);

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Gateway cancelled");
                    break;
                }
                Some(advertisement) = advertisements.recv() => {
                    on_advertisement(&mut hub, advertisement, clock.now());
                }
                Some(payload) = notifications.recv() => {
                    if let Err(e) = hub.handle_gatt_notification(&payload, clock.now()) {
                        debug!("Dropped notification: {}", e);
                    }
                }
                Some(command) = commands_rx.recv() => {
                    on_command(&mut hub, command, clock.now());
                }
                _ = ticker.tick() => {
                    let outcome = hub.tick(scanner.as_ref(), link.as_ref(), clock.now()).await;
                    if !matches!(outcome, TickOutcome::Idle | TickOutcome::ScanRunning) {
                        debug!("Scheduler: {:?}", outcome);
                    }
                }
                _ = reporter.tick(), if report_period.is_some() => {
                    for line in hub.status_report(clock.now()).lines() {
                        info!("{}", line);
                    }
                }
            }
        }

        hub
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("hub", &self.hub)
            .field("options", &self.options)
            .finish()
    }
}

fn on_advertisement(hub: &mut SensorHub, advertisement: Advertisement, now: OffsetDateTime) {
    let Advertisement {
        address,
        service_uuid,
        data,
    } = advertisement;

    match hub.handle_advertisement(address, service_uuid, &data, now) {
        Ok(_) => {}
        Err(Error::UnknownDevice(_)) => {}
        Err(e) if e.is_dropped_packet() => {
            debug!("Dropped advertisement from {}: {}", address, e);
        }
        Err(e) => trace!("Advertisement from {}: {}", address, e),
    }
}

fn on_command(hub: &mut SensorHub, command: Command, now: OffsetDateTime) {
    match command {
        Command::Values(selector, reply) => {
            let _ = reply.send(hub.values(&selector).copied());
        }
        Command::ForceRefresh(selector, reply) => {
            let result = hub.force_refresh(&selector, now);
            if result.is_ok() {
                info!("Forced refresh of {}", selector);
            }
            let _ = reply.send(result);
        }
        Command::Report(reply) => {
            let _ = reply.send(hub.status_report(now));
        }
    }
}
