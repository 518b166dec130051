//! Listener fan-out for refreshed sensor data.
//!
//! Listeners are called synchronously, in registration order, once per
//! advertisement or notification that flagged at least one metric.
//! [`BroadcastListener`] bridges the synchronous fan-out onto a
//! `tokio::sync::broadcast` channel of serializable [`SensorEvent`]s.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use mitemp_types::{ChangedMetrics, DeviceAddress, SensorValues};

/// How the data behind an event reached the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Passive advertisement.
    Advertisement,
    /// Notification over an active connection.
    Connection,
}

/// Borrowed view of a data refresh handed to listeners.
#[derive(Debug, Clone, Copy)]
pub struct DataEvent<'a> {
    /// Device address.
    pub address: DeviceAddress,
    /// Device alias, if registered with one.
    pub alias: Option<&'a str>,
    /// Which metric classes are new enough to report.
    pub changes: ChangedMetrics,
    /// All current values of the device.
    pub values: &'a SensorValues,
    /// Where the data came from.
    pub source: DataSource,
}

impl DataEvent<'_> {
    /// Owned, serializable copy of this event.
    pub fn to_owned_event(&self) -> SensorEvent {
        SensorEvent {
            address: self.address,
            alias: self.alias.map(str::to_string),
            changes: self.changes,
            values: *self.values,
            source: self.source,
        }
    }
}

/// Receives data refresh notifications.
pub trait SensorListener: Send + Sync {
    /// Called once per event that flagged at least one metric.
    fn on_data(&self, event: &DataEvent<'_>);
}

impl<F> SensorListener for F
where
    F: Fn(&DataEvent<'_>) + Send + Sync,
{
    fn on_data(&self, event: &DataEvent<'_>) {
        self(event)
    }
}

/// Ordered set of listeners.
#[derive(Default)]
pub struct Listeners {
    listeners: Vec<Box<dyn SensorListener>>,
}

impl Listeners {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener.
    pub fn add(&mut self, listener: impl SensorListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Call every listener in registration order.
    pub fn notify(&self, event: &DataEvent<'_>) {
        for listener in &self.listeners {
            listener.on_data(event);
        }
    }

    /// Number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// True if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

/// Owned data refresh event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    /// Device address.
    pub address: DeviceAddress,
    /// Device alias.
    pub alias: Option<String>,
    /// Which metric classes are new enough to report.
    pub changes: ChangedMetrics,
    /// All current values of the device.
    pub values: SensorValues,
    /// Where the data came from.
    pub source: DataSource,
}

/// Sender for sensor events.
pub type EventSender = broadcast::Sender<SensorEvent>;

/// Receiver for sensor events.
pub type EventReceiver = broadcast::Receiver<SensorEvent>;

/// Listener that republishes events on a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastListener {
    sender: EventSender,
}

impl BroadcastListener {
    /// Create a listener with its own channel.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the sender for direct use.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }
}

impl Default for BroadcastListener {
    fn default() -> Self {
        Self::new(100)
    }
}

impl SensorListener for BroadcastListener {
    fn on_data(&self, event: &DataEvent<'_>) {
        // Ignore error if no receivers
        let _ = self.sender.send(event.to_owned_event());
    }
}
