//! Mock radio collaborators for testing.
//!
//! This module provides scanner and link implementations that record what
//! the scheduler asked of them, plus helpers that build well-formed MiBeacon
//! frames, so the whole gateway can be exercised without BLE hardware.
//!
//! # Features
//!
//! - **Failure injection**: make connect, subscribe or pause fail
//! - **Canned notifications**: have the link deliver a payload on subscribe
//! - **Call recording**: inspect the exact sequence of link operations

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use mitemp_types::{BindKey, DeviceAddress};

use crate::crypto::{ASSOCIATED_DATA, AesCcmCipher, NONCE_LEN};
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::events::{DataEvent, SensorEvent, SensorListener};
use crate::traits::{ScanControl, SensorLink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mock passive scanner.
///
/// # Example
///
/// ```
/// use mitemp_core::{MockScanner, ScanControl};
///
/// #[tokio::main]
/// async fn main() {
///     let scanner = MockScanner::new();
///     scanner.pause().await.unwrap();
///     assert!(scanner.is_paused());
///     scanner.resume().await.unwrap();
///     assert_eq!(scanner.resume_count(), 1);
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockScanner {
    running: AtomicBool,
    paused: AtomicBool,
    fail_pause: AtomicBool,
    pause_count: AtomicU32,
    resume_count: AtomicU32,
}

impl MockScanner {
    /// Create an idle, unpaused scanner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a scan window is open or closed.
    pub fn set_scan_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    /// Make [`ScanControl::pause`] fail.
    pub fn fail_pause(&self, fail: bool) {
        self.fail_pause.store(fail, Ordering::Relaxed);
    }

    /// Whether the scan is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Number of successful pause calls.
    pub fn pause_count(&self) -> u32 {
        self.pause_count.load(Ordering::Relaxed)
    }

    /// Number of resume calls.
    pub fn resume_count(&self) -> u32 {
        self.resume_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ScanControl for MockScanner {
    fn is_scan_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    async fn pause(&self) -> Result<()> {
        if self.fail_pause.load(Ordering::Relaxed) {
            return Err(Error::Bluetooth(btleplug::Error::NotSupported(
                "mock pause failure".into(),
            )));
        }
        self.paused.store(true, Ordering::Relaxed);
        self.running.store(false, Ordering::Relaxed);
        self.pause_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.paused.store(false, Ordering::Relaxed);
        self.resume_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// An operation requested from a [`MockLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    /// `connect(address)`.
    Connect(DeviceAddress),
    /// `subscribe(characteristic)`.
    Subscribe(Uuid),
    /// `disconnect()`.
    Disconnect,
}

/// A mock GATT link.
#[derive(Debug, Default)]
pub struct MockLink {
    calls: Mutex<Vec<LinkCall>>,
    connected: Mutex<Option<DeviceAddress>>,
    fail_connect: AtomicBool,
    fail_subscribe: AtomicBool,
    notification: Mutex<Option<(mpsc::Sender<Vec<u8>>, Vec<u8>)>>,
}

impl MockLink {
    /// Create a link that accepts every connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connect` fail.
    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::Relaxed);
    }

    /// Make `subscribe` fail.
    pub fn fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::Relaxed);
    }

    /// Deliver `payload` on `notifications` after every successful subscribe.
    pub fn respond_with(&self, notifications: mpsc::Sender<Vec<u8>>, payload: Vec<u8>) {
        *lock(&self.notification) = Some((notifications, payload));
    }

    /// Every operation requested so far, in order.
    pub fn calls(&self) -> Vec<LinkCall> {
        lock(&self.calls).clone()
    }

    /// Currently connected device.
    pub fn connected(&self) -> Option<DeviceAddress> {
        *lock(&self.connected)
    }

    fn record(&self, call: LinkCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl SensorLink for MockLink {
    async fn connect(&self, address: DeviceAddress) -> Result<()> {
        self.record(LinkCall::Connect(address));
        if self.fail_connect.load(Ordering::Relaxed) {
            return Err(Error::connection_failed(
                address,
                ConnectionFailureReason::LinkFailed("mock connect failure".into()),
            ));
        }
        *lock(&self.connected) = Some(address);
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<()> {
        self.record(LinkCall::Subscribe(characteristic));
        let address = self
            .connected()
            .ok_or(Error::Bluetooth(btleplug::Error::NotConnected))?;
        if self.fail_subscribe.load(Ordering::Relaxed) {
            return Err(Error::connection_failed(
                address,
                ConnectionFailureReason::SubscribeFailed("mock subscribe failure".into()),
            ));
        }

        let pending = lock(&self.notification).clone();
        if let Some((sender, payload)) = pending {
            let _ = sender.try_send(payload);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(LinkCall::Disconnect);
        *lock(&self.connected) = None;
        Ok(())
    }
}

/// A listener that keeps every event it receives.
///
/// Clones share the same event log.
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<SensorEvent>>>,
}

impl RecordingListener {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far.
    pub fn events(&self) -> Vec<SensorEvent> {
        lock(&self.events).clone()
    }

    /// Number of events received.
    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    /// True if nothing was received.
    pub fn is_empty(&self) -> bool {
        lock(&self.events).is_empty()
    }
}

impl SensorListener for RecordingListener {
    fn on_data(&self, event: &DataEvent<'_>) {
        lock(&self.events).push(event.to_owned_event());
    }
}

/// Frame control and device type of a plaintext LYWSDCGQ frame.
const PLAINTEXT_HEADER: [u8; 4] = [0x50, 0x20, 0xAA, 0x01];

/// Frame control and device type of an encrypted LYWSD03MMC frame.
const ENCRYPTED_HEADER: [u8; 4] = [0x58, 0x58, 0x5B, 0x05];

/// Build a plaintext MiBeacon frame carrying `record`.
pub fn plaintext_frame(address: DeviceAddress, packet_id: u8, record: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(11 + record.len());
    frame.extend_from_slice(&PLAINTEXT_HEADER);
    frame.push(packet_id);
    frame.extend_from_slice(&address.over_the_air());
    frame.extend_from_slice(record);
    frame
}

/// Build an encrypted MiBeacon frame carrying `record`.
///
/// A 4-byte record yields a 22-byte frame and a 5-byte record a 23-byte
/// frame. Only the low three bytes of `counter` are used.
///
/// # Errors
///
/// Returns an error if the cipher rejects the input.
pub fn encrypted_frame(
    key: &BindKey,
    address: DeviceAddress,
    packet_id: u8,
    record: &[u8],
    counter: u32,
) -> Result<Vec<u8>> {
    let mac = address.over_the_air();
    let counter = &counter.to_le_bytes()[..3];

    let mut nonce = [0u8; NONCE_LEN];
    nonce[..6].copy_from_slice(&mac);
    nonce[6..8].copy_from_slice(&ENCRYPTED_HEADER[2..]);
    nonce[8] = packet_id;
    nonce[9..].copy_from_slice(counter);

    let (ciphertext, tag) = AesCcmCipher.encrypt(key, &nonce, &ASSOCIATED_DATA, record)?;

    let mut frame = Vec::with_capacity(22 + record.len().saturating_sub(4));
    frame.extend_from_slice(&ENCRYPTED_HEADER);
    frame.push(packet_id);
    frame.extend_from_slice(&mac);
    frame.extend_from_slice(&ciphertext);
    frame.extend_from_slice(counter);
    frame.extend_from_slice(&tag);
    Ok(frame)
}
