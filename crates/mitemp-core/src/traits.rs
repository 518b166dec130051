//! Radio collaborator abstractions.
//!
//! The scheduler talks to the BLE stack only through these traits, so it can
//! be driven by the btleplug backend in [`crate::ble`] or by the mocks in
//! [`crate::mock`].

use async_trait::async_trait;
use uuid::Uuid;

use mitemp_types::DeviceAddress;

use crate::error::Result;

/// One service data element of an observed advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Advertiser address.
    pub address: DeviceAddress,
    /// Service data UUID.
    pub service_uuid: Uuid,
    /// Raw service data.
    pub data: Vec<u8>,
}

/// Control over the passive advertisement scan.
///
/// Passive scanning and active connections share one radio, so the scheduler
/// pauses the scan around every connection attempt.
///
/// # Example
///
/// ```ignore
/// use mitemp_core::{ScanControl, Result};
///
/// async fn with_scan_paused<S: ScanControl>(scanner: &S) -> Result<()> {
///     scanner.pause().await?;
///     // talk to a device
///     scanner.resume().await
/// }
/// ```
#[async_trait]
pub trait ScanControl: Send + Sync {
    /// Whether a scan window is currently open.
    fn is_scan_running(&self) -> bool;

    /// Stop scanning and do not start new windows until resumed.
    async fn pause(&self) -> Result<()>;

    /// Allow scan windows again.
    async fn resume(&self) -> Result<()>;
}

/// An active GATT link to one sensor at a time.
///
/// Notification payloads are not returned from these calls; the
/// implementation delivers them asynchronously to whoever owns its
/// notification channel.
#[async_trait]
pub trait SensorLink: Send + Sync {
    /// Connect to a device.
    async fn connect(&self, address: DeviceAddress) -> Result<()>;

    /// Subscribe to notifications of a characteristic on the connected device.
    async fn subscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Drop the current connection, if any.
    async fn disconnect(&self) -> Result<()>;
}
