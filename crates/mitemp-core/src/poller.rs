//! Active refresh scheduling.
//!
//! The [`Poller`] runs a single-connection state machine, advanced once per
//! tick:
//!
//! ```text
//!            deadline due + recently seen
//!   Idle ─────────────────────────────────▶ AwaitingData
//!    ▲                                         │      │
//!    │ timeout: disconnect, resume scan        │      │ notification
//!    ├─────────────────────────────────────────┘      ▼
//!    └─────────────── disconnect, resume scan ── DataReceived
//! ```
//!
//! Scanning and connecting share one radio: while a scan window is open the
//! tick does nothing, and the scan is paused for the length of a session.

use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use mitemp_types::DeviceAddress;
use mitemp_types::uuids::LYWSD03MMC_DATA;

use crate::error::{Error, Result};
use crate::freshness::{deadline_after, in_proximity};
use crate::registry::{DeviceHandle, DeviceRegistry};
use crate::traits::{ScanControl, SensorLink};

/// Default time to wait for a notification after connecting.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Default advertisement recency required before connecting.
pub const DEFAULT_PROXIMITY_WINDOW: Duration = Duration::from_secs(30);

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerOptions {
    /// How long a session may wait for data.
    pub connection_timeout: Duration,
    /// How recently a device must have advertised to be connected to.
    pub proximity_window: Duration,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            proximity_window: DEFAULT_PROXIMITY_WINDOW,
        }
    }
}

impl PollerOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the proximity window.
    #[must_use]
    pub fn proximity_window(mut self, window: Duration) -> Self {
        self.proximity_window = window;
        self
    }

    /// Spacing between the initial refresh deadlines of consecutive devices.
    #[must_use]
    pub fn stagger(&self) -> Duration {
        self.connection_timeout.saturating_mul(2)
    }

    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the timeout or window is zero.
    pub fn validate(&self) -> Result<()> {
        if self.connection_timeout.is_zero() {
            return Err(Error::invalid_config("connection timeout must be nonzero"));
        }
        if self.proximity_window.is_zero() {
            return Err(Error::invalid_config("proximity window must be nonzero"));
        }
        Ok(())
    }
}

/// State of the connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection.
    Idle,
    /// Connected and subscribed, waiting for a notification.
    AwaitingData,
    /// Data arrived; the next tick disconnects.
    DataReceived,
}

/// The single in-flight connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSession {
    /// Targeted device.
    pub handle: DeviceHandle,
    /// Its address.
    pub address: DeviceAddress,
    /// When the session started.
    pub started_at: OffsetDateTime,
    /// Current state, never [`ConnectionState::Idle`].
    pub state: ConnectionState,
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A scan window is open; nothing was evaluated.
    ScanRunning,
    /// Idle, and no device needs a refresh.
    Idle,
    /// Connected and subscribed to a device.
    Connected(DeviceAddress),
    /// Connecting or subscribing failed; back to idle.
    ConnectFailed(DeviceAddress),
    /// Still waiting for data.
    Waiting(DeviceAddress),
    /// No data arrived in time; disconnected.
    TimedOut(DeviceAddress),
    /// Data arrived; disconnected.
    Completed(DeviceAddress),
}

/// Single-outstanding-connection scheduler.
#[derive(Debug, Clone, Default)]
pub struct Poller {
    options: PollerOptions,
    session: Option<ConnectionSession>,
}

impl Poller {
    /// Create an idle poller.
    pub fn new(options: PollerOptions) -> Self {
        Self {
            options,
            session: None,
        }
    }

    /// Scheduler tuning.
    pub fn options(&self) -> &PollerOptions {
        &self.options
    }

    /// The in-flight session, if any.
    pub fn session(&self) -> Option<&ConnectionSession> {
        self.session.as_ref()
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.session
            .map_or(ConnectionState::Idle, |session| session.state)
    }

    /// Record that the connected device delivered data.
    ///
    /// Returns the targeted device, or `None` when no session is open.
    pub fn mark_data_received(&mut self) -> Option<DeviceHandle> {
        let session = self.session.as_mut()?;
        session.state = ConnectionState::DataReceived;
        Some(session.handle)
    }

    /// Advance the state machine by one step.
    pub async fn tick(
        &mut self,
        registry: &mut DeviceRegistry,
        scanner: &dyn ScanControl,
        link: &dyn SensorLink,
        now: OffsetDateTime,
    ) -> TickOutcome {
        if scanner.is_scan_running() {
            return TickOutcome::ScanRunning;
        }

        match self.session {
            None => self.start_session(registry, scanner, link, now).await,
            Some(session) => match session.state {
                ConnectionState::AwaitingData => {
                    if now > deadline_after(session.started_at, self.options.connection_timeout) {
                        let err = Error::Timeout {
                            address: session.address,
                            duration: self.options.connection_timeout,
                        };
                        warn!("{}", err);
                        self.end_session(scanner, link).await;
                        TickOutcome::TimedOut(session.address)
                    } else {
                        TickOutcome::Waiting(session.address)
                    }
                }
                ConnectionState::DataReceived => {
                    info!("Disconnecting from {} after data received", session.address);
                    self.end_session(scanner, link).await;
                    TickOutcome::Completed(session.address)
                }
                ConnectionState::Idle => {
                    self.session = None;
                    TickOutcome::Idle
                }
            },
        }
    }

    async fn start_session(
        &mut self,
        registry: &mut DeviceRegistry,
        scanner: &dyn ScanControl,
        link: &dyn SensorLink,
        now: OffsetDateTime,
    ) -> TickOutcome {
        let window = self.options.proximity_window;
        let candidate = registry
            .iter()
            .find(|(_, entry)| {
                entry.registration.model.supports_active_poll()
                    && entry.refresh_due(now)
                    && in_proximity(entry.last_advertisement, window, now)
            })
            .map(|(handle, _)| handle);

        let Some(handle) = candidate else {
            return TickOutcome::Idle;
        };
        let Some(entry) = registry.get_mut(handle) else {
            return TickOutcome::Idle;
        };

        let address = entry.registration.address;
        let interval = entry.registration.refresh_interval;
        entry.next_refresh = (!interval.is_zero()).then(|| deadline_after(now, interval));

        info!(
            "Connecting to {} ({}) for a refresh",
            entry.registration.display_name(),
            address
        );

        if let Err(e) = scanner.pause().await {
            warn!("Failed to pause scanning: {}", e);
        }

        if let Err(e) = connect_and_subscribe(link, address).await {
            warn!("{}", e);
            if let Err(e) = link.disconnect().await {
                debug!("Disconnect after failed connection: {}", e);
            }
            resume(scanner).await;
            return TickOutcome::ConnectFailed(address);
        }

        self.session = Some(ConnectionSession {
            handle,
            address,
            started_at: now,
            state: ConnectionState::AwaitingData,
        });
        TickOutcome::Connected(address)
    }

    async fn end_session(&mut self, scanner: &dyn ScanControl, link: &dyn SensorLink) {
        if let Err(e) = link.disconnect().await {
            warn!("Failed to disconnect: {}", e);
        }
        resume(scanner).await;
        self.session = None;
    }
}

async fn connect_and_subscribe(link: &dyn SensorLink, address: DeviceAddress) -> Result<()> {
    link.connect(address).await?;
    link.subscribe(LYWSD03MMC_DATA).await
}

async fn resume(scanner: &dyn ScanControl) {
    if let Err(e) = scanner.resume().await {
        warn!("Failed to resume scanning: {}", e);
    }
}
