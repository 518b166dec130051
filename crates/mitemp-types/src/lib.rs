//! Platform-agnostic types for Xiaomi MiTemp BLE thermometers.
//!
//! This crate provides shared types used by the decode engine in
//! `mitemp-core` and by anything that only needs to interpret sensor data.
//!
//! # Features
//!
//! - Device addresses and bind keys
//! - MiBeacon object records shared by the plaintext and encrypted dialects
//! - GATT notification readings
//! - Per-device latest values with observation timestamps
//! - UUID constants for BLE services and characteristics
//!
//! # Example
//!
//! ```
//! use mitemp_types::{Record, SensorValues};
//! use time::OffsetDateTime;
//!
//! let record = Record::decode(&[0x0A, 0x10, 0x01, 80]).unwrap().unwrap();
//! let mut values = SensorValues::default();
//! values.apply_record(&record, OffsetDateTime::now_utc());
//! assert_eq!(values.battery, 80.0);
//! ```

pub mod address;
pub mod error;
pub mod record;
pub mod types;
pub mod uuid;

pub use address::DeviceAddress;
pub use error::{ParseError, ParseResult};
pub use record::{GattReading, Record};
pub use types::{
    BindKey, ChangedMetrics, Dialect, Metric, SensorModel, SensorValues, UNKNOWN_TEMPERATURE,
    UNKNOWN_VALUE,
};
pub use uuid as uuids;
