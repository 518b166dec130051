//! Decode engine and polling scheduler for Xiaomi MiTemp BLE thermometers.
//!
//! This crate turns MiBeacon advertisements into per-device sensor values,
//! and opportunistically connects to sensors whose data has gone stale.
//!
//! # Features
//!
//! - **Two advertisement dialects**: plaintext and AES-CCM encrypted
//!   MiBeacon frames, decoded through one record table
//! - **Debounced notifications**: per metric, per device
//! - **Active refresh**: one connection at a time, only to devices seen
//!   advertising recently, with scanning paused around it
//! - **Pluggable radio**: btleplug backend, or mocks for tests
//!
//! # Supported Devices
//!
//! | Device | Advertisement | Active refresh |
//! |--------|---------------|----------------|
//! | LYWSDCGQ | Plaintext | No |
//! | LYWSD03MMC | Encrypted (bind key needed) | Yes |
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use mitemp_core::{
//!     BtleLink, BtleScanner, DeviceRegistration, Gateway, GatewayOptions, LinkOptions,
//!     PollerOptions, ScanOptions, SensorHub, ble::get_adapter,
//! };
//! use mitemp_core::types::SensorModel;
//! use time::OffsetDateTime;
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut hub = SensorHub::new(PollerOptions::default());
//!     hub.register(
//!         DeviceRegistration::new("A4:C1:38:01:02:03".parse()?, SensorModel::Lywsd03mmc)
//!             .alias("Square")
//!             .key("0102030405060708090a0b0c0d0e0f10".parse()?)
//!             .refresh_interval(Duration::from_secs(180)),
//!         OffsetDateTime::now_utc(),
//!     );
//!     hub.add_listener(|event: &mitemp_core::DataEvent<'_>| {
//!         println!("{:?}: {:?}", event.alias, event.changes);
//!     });
//!
//!     let adapter = get_adapter().await?;
//!     let (adv_tx, adv_rx) = mpsc::channel(64);
//!     let (notify_tx, notify_rx) = mpsc::channel(8);
//!     let scanner = Arc::new(BtleScanner::new(adapter.clone(), ScanOptions::default()));
//!     let link = Arc::new(BtleLink::new(adapter, LinkOptions::default(), notify_tx));
//!
//!     let cancel = CancellationToken::new();
//!     scanner.start(adv_tx, cancel.clone());
//!     Gateway::new(hub, scanner, link, GatewayOptions::default())
//!         .run(adv_rx, notify_rx, cancel)
//!         .await;
//!     Ok(())
//! }
//! ```

pub mod advertisement;
pub mod ble;
pub mod crypto;
pub mod error;
pub mod events;
pub mod freshness;
pub mod gateway;
pub mod hub;
pub mod mock;
pub mod poller;
pub mod registry;
pub mod traits;

// Re-export the types crate
pub use mitemp_types::types;
pub use mitemp_types::uuids;

// Core exports
pub use ble::{BtleLink, BtleScanner, LinkOptions, ScanOptions};
pub use crypto::{AesCcmCipher, PayloadCipher};
pub use error::{ConnectionFailureReason, DecryptFailureReason, Error, Result};
pub use events::{
    BroadcastListener, DataEvent, DataSource, EventReceiver, EventSender, Listeners, SensorEvent,
    SensorListener,
};
pub use freshness::DebounceIntervals;
pub use gateway::{Clock, Gateway, GatewayHandle, GatewayOptions};
pub use hub::SensorHub;
pub use mock::{LinkCall, MockLink, MockScanner, RecordingListener};
pub use poller::{ConnectionState, Poller, PollerOptions, TickOutcome};
pub use registry::{DeviceHandle, DeviceRegistration, DeviceRegistry, DeviceSelector};
pub use traits::{Advertisement, ScanControl, SensorLink};

// Re-export from mitemp-types
pub use mitemp_types::{
    BindKey, ChangedMetrics, DeviceAddress, GattReading, Metric, ParseError, Record, SensorModel,
    SensorValues,
};
