//! btleplug implementations of the radio collaborators.
//!
//! [`BtleScanner`] runs passive scan windows on a duty cycle and forwards
//! every service data element it sees. [`BtleLink`] holds the single active
//! GATT connection and forwards notifications of the subscribed
//! characteristic.
//!
//! # Platform Differences
//!
//! On macOS CoreBluetooth hides link-layer addresses, so advertisements
//! cannot be matched to registered devices there. Linux and Windows report
//! real addresses.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use mitemp_types::DeviceAddress;
use mitemp_types::uuids::{COMM_INTERVAL_500MS, LYWSD03MMC_COMM_INTERVAL, LYWSD03MMC_SERVICE};

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::traits::{Advertisement, ScanControl, SensorLink};

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters.into_iter().next().ok_or(Error::NoAdapter)
}

/// Passive scan duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Length of one scan window.
    pub scan_duration: Duration,
    /// Gap between two windows.
    pub scan_pause: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(6),
            scan_pause: Duration::from_secs(1),
        }
    }
}

impl ScanOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan window length.
    #[must_use]
    pub fn scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Set the gap between windows.
    #[must_use]
    pub fn scan_pause(mut self, pause: Duration) -> Self {
        self.scan_pause = pause;
        self
    }
}

/// Duty-cycled passive scanner.
pub struct BtleScanner {
    adapter: Adapter,
    options: ScanOptions,
    running: AtomicBool,
    paused: AtomicBool,
    // Serializes start/stop calls against pause/resume.
    radio: Mutex<()>,
}

impl BtleScanner {
    /// Create a scanner on `adapter`.
    pub fn new(adapter: Adapter, options: ScanOptions) -> Self {
        Self {
            adapter,
            options,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            radio: Mutex::new(()),
        }
    }

    /// Start forwarding advertisements and running scan windows.
    ///
    /// The task runs until the cancellation token is triggered or the
    /// receiving end of `advertisements` is dropped.
    pub fn start(
        self: &Arc<Self>,
        advertisements: mpsc::Sender<Advertisement>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let scanner = Arc::clone(self);

        tokio::spawn(async move {
            info!("Starting passive scanner");

            let events = match scanner.adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    warn!("Cannot listen for advertisements: {}", e);
                    return;
                }
            };

            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Passive scanner cancelled");
                }
                _ = scanner.forward(events, advertisements) => {
                    info!("Advertisement receiver closed");
                }
                _ = scanner.duty_cycle() => {}
            }

            if let Err(e) = scanner.stop_window().await {
                debug!("Stopping scan on exit: {}", e);
            }
        })
    }

    async fn forward(
        &self,
        mut events: std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>,
        advertisements: mpsc::Sender<Advertisement>,
    ) {
        while let Some(event) = events.next().await {
            let CentralEvent::ServiceDataAdvertisement { id, service_data } = event else {
                continue;
            };

            let address = match self.adapter.peripheral(&id).await {
                Ok(peripheral) => DeviceAddress::new(peripheral.address().into_inner()),
                Err(e) => {
                    trace!("Advertisement from unknown peripheral {:?}: {}", id, e);
                    continue;
                }
            };

            for (service_uuid, data) in service_data {
                let advertisement = Advertisement {
                    address,
                    service_uuid,
                    data,
                };
                if advertisements.send(advertisement).await.is_err() {
                    return;
                }
            }
        }
    }

    async fn duty_cycle(&self) {
        loop {
            if let Err(e) = self.start_window().await {
                warn!("Failed to start scan window: {}", e);
            }
            sleep(self.options.scan_duration).await;
            if let Err(e) = self.stop_window().await {
                warn!("Failed to stop scan window: {}", e);
            }
            sleep(self.options.scan_pause).await;
        }
    }

    async fn start_window(&self) -> Result<()> {
        let _radio = self.radio.lock().await;
        if self.paused.load(Ordering::Acquire) {
            return Ok(());
        }
        self.adapter.start_scan(ScanFilter::default()).await?;
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop_window(&self) -> Result<()> {
        let _radio = self.radio.lock().await;
        if self.running.swap(false, Ordering::AcqRel) {
            self.adapter.stop_scan().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ScanControl for BtleScanner {
    fn is_scan_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::Release);
        self.stop_window().await
    }

    async fn resume(&self) -> Result<()> {
        self.paused.store(false, Ordering::Release);
        Ok(())
    }
}

impl std::fmt::Debug for BtleScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleScanner")
            .field("options", &self.options)
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("paused", &self.paused.load(Ordering::Relaxed))
            .finish()
    }
}

/// Active link settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    /// Upper bound for connecting and discovering services.
    pub connect_timeout: Duration,
    /// Write a 500 ms connection interval after connecting, to save the
    /// sensor's battery.
    pub write_comm_interval: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            write_comm_interval: false,
        }
    }
}

struct Connection {
    peripheral: Peripheral,
    address: DeviceAddress,
    forwarder: Option<JoinHandle<()>>,
}

/// Single active GATT connection.
pub struct BtleLink {
    adapter: Adapter,
    options: LinkOptions,
    notifications: mpsc::Sender<Vec<u8>>,
    connection: Mutex<Option<Connection>>,
}

impl BtleLink {
    /// Create a link that delivers notification payloads on `notifications`.
    pub fn new(adapter: Adapter, options: LinkOptions, notifications: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            adapter,
            options,
            notifications,
            connection: Mutex::new(None),
        }
    }

    async fn find_peripheral(&self, address: DeviceAddress) -> Result<Peripheral> {
        for peripheral in self.adapter.peripherals().await? {
            if peripheral.address().into_inner() == address.octets() {
                return Ok(peripheral);
            }
        }
        Err(Error::connection_failed(
            address,
            ConnectionFailureReason::NotDiscovered,
        ))
    }

    /// Set the sensor's connection interval to 500 ms.
    ///
    /// # Errors
    ///
    /// Fails if no device is connected or the characteristic is missing.
    pub async fn write_comm_interval(&self) -> Result<()> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .ok_or(Error::Bluetooth(btleplug::Error::NotConnected))?;

        let characteristics = connection.peripheral.characteristics();
        let characteristic = sensor_characteristic(characteristics, LYWSD03MMC_COMM_INTERVAL)
            .ok_or_else(|| {
                Error::connection_failed(
                    connection.address,
                    ConnectionFailureReason::SubscribeFailed(format!(
                        "characteristic {} not found",
                        LYWSD03MMC_COMM_INTERVAL
                    )),
                )
            })?;

        connection
            .peripheral
            .write(&characteristic, &COMM_INTERVAL_500MS, WriteType::WithResponse)
            .await?;
        Ok(())
    }
}

/// Find a characteristic of the sensor's data service.
fn sensor_characteristic(
    characteristics: impl IntoIterator<Item = Characteristic>,
    uuid: Uuid,
) -> Option<Characteristic> {
    characteristics
        .into_iter()
        .find(|c| c.service_uuid == LYWSD03MMC_SERVICE && c.uuid == uuid)
}

/// Run `attempt` within `limit`, running `release` if it fails or runs out.
///
/// A link that connected but failed discovery is still open on the radio,
/// so it has to be torn down before the error is reported.
async fn bounded_or_release<T>(
    limit: Duration,
    address: DeviceAddress,
    attempt: impl Future<Output = Result<T>>,
    release: impl Future<Output = ()>,
) -> Result<T> {
    let result = match timeout(limit, attempt).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            address,
            duration: limit,
        }),
    };
    if result.is_err() {
        release.await;
    }
    result
}

impl std::fmt::Debug for BtleLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleLink")
            .field("options", &self.options)
            .finish()
    }
}

#[async_trait]
impl SensorLink for BtleLink {
    async fn connect(&self, address: DeviceAddress) -> Result<()> {
        let mut guard = self.connection.lock().await;
        if guard.is_some() {
            return Err(Error::connection_failed(
                address,
                ConnectionFailureReason::Busy,
            ));
        }

        let peripheral = self.find_peripheral(address).await?;
        let link_failed = |e: btleplug::Error| {
            Error::connection_failed(address, ConnectionFailureReason::LinkFailed(e.to_string()))
        };

        let attempt = async {
            peripheral.connect().await.map_err(link_failed)?;
            peripheral.discover_services().await.map_err(link_failed)
        };
        let release = async {
            if let Err(e) = peripheral.disconnect().await {
                debug!("Failed to release {} after setup error: {}", address, e);
            }
        };
        bounded_or_release(self.options.connect_timeout, address, attempt, release).await?;

        debug!(
            "Connected to {}, {} characteristics",
            address,
            peripheral.characteristics().len()
        );

        *guard = Some(Connection {
            peripheral,
            address,
            forwarder: None,
        });
        drop(guard);

        if self.options.write_comm_interval {
            if let Err(e) = self.write_comm_interval().await {
                warn!("Failed to set connection interval on {}: {}", address, e);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<()> {
        let mut guard = self.connection.lock().await;
        let connection = guard
            .as_mut()
            .ok_or(Error::Bluetooth(btleplug::Error::NotConnected))?;
        let address = connection.address;
        let subscribe_failed = |reason: String| {
            Error::connection_failed(address, ConnectionFailureReason::SubscribeFailed(reason))
        };

        let target = sensor_characteristic(connection.peripheral.characteristics(), characteristic)
            .ok_or_else(|| subscribe_failed(format!("characteristic {} not found", characteristic)))?;

        connection
            .peripheral
            .subscribe(&target)
            .await
            .map_err(|e| subscribe_failed(e.to_string()))?;

        let mut stream = connection.peripheral.notifications().await?;
        let sender = self.notifications.clone();
        connection.forwarder = Some(tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid == characteristic
                    && sender.send(notification.value).await.is_err()
                {
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(connection) = self.connection.lock().await.take() else {
            return Ok(());
        };

        if let Some(forwarder) = connection.forwarder {
            forwarder.abort();
        }
        connection.peripheral.disconnect().await?;
        debug!("Disconnected from {}", connection.address);
        Ok(())
    }
}
