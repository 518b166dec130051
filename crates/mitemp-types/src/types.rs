//! Core types for MiTemp sensor data.

use core::fmt;
use core::str::FromStr;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;
use crate::record::{GattReading, Record};

/// Sensor value reported before the first temperature observation.
pub const UNKNOWN_TEMPERATURE: f32 = -100.0;

/// Sensor value reported before the first humidity, battery or voltage observation.
pub const UNKNOWN_VALUE: f32 = -1.0;

/// Supported sensor models.
///
/// The model selects the advertisement dialect used to decode service data.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new sensor models
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[non_exhaustive]
pub enum SensorModel {
    /// Round e-ink thermometer, advertises plaintext MiBeacon frames.
    Lywsdcgq,
    /// Square LCD thermometer, advertises encrypted MiBeacon frames and
    /// supports an active GATT connection.
    Lywsd03mmc,
}

impl SensorModel {
    /// Advertisement dialect broadcast by this model.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        match self {
            SensorModel::Lywsdcgq => Dialect::Plaintext,
            SensorModel::Lywsd03mmc => Dialect::Encrypted,
        }
    }

    /// Whether this model can be actively polled over GATT.
    #[must_use]
    pub fn supports_active_poll(&self) -> bool {
        matches!(self, SensorModel::Lywsd03mmc)
    }
}

impl FromStr for SensorModel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lywsdcgq" => Ok(SensorModel::Lywsdcgq),
            "lywsd03mmc" => Ok(SensorModel::Lywsd03mmc),
            _ => Err(ParseError::UnknownModel(s.to_string())),
        }
    }
}

impl fmt::Display for SensorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorModel::Lywsdcgq => write!(f, "LYWSDCGQ"),
            SensorModel::Lywsd03mmc => write!(f, "LYWSD03MMC"),
        }
    }
}

/// Framing used to carry the shared record format inside service data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Dialect {
    /// Record sits at a fixed offset of the service data.
    Plaintext,
    /// Record is AES-CCM encrypted and must be unwrapped first.
    Encrypted,
}

/// A 16-byte MiBeacon bind key.
///
/// The `Debug` output never includes key material.
#[derive(Clone, PartialEq, Eq)]
pub struct BindKey([u8; 16]);

impl BindKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for BindKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BindKey(..)")
    }
}

impl FromStr for BindKey {
    type Err = ParseError;

    /// Parse a key from 32 hex characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| ParseError::InvalidKey(e.to_string()))?;
        let key: [u8; 16] = bytes.try_into().map_err(|v: Vec<u8>| {
            ParseError::InvalidKey(format!("expected 16 bytes, got {}", v.len()))
        })?;
        Ok(Self(key))
    }
}

/// Metric classes tracked per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Metric {
    /// Temperature in degrees Celsius.
    Temperature,
    /// Relative humidity in percent.
    Humidity,
    /// Battery level in percent.
    Battery,
    /// Battery voltage in volts.
    Voltage,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Temperature => write!(f, "temperature"),
            Metric::Humidity => write!(f, "humidity"),
            Metric::Battery => write!(f, "battery"),
            Metric::Voltage => write!(f, "voltage"),
        }
    }
}

/// Which notification classes a single event touched or flagged.
///
/// Voltage belongs to the battery class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangedMetrics {
    /// Temperature was refreshed.
    pub temperature: bool,
    /// Humidity was refreshed.
    pub humidity: bool,
    /// Battery (percent or voltage) was refreshed.
    pub battery: bool,
}

impl ChangedMetrics {
    /// No metric changed.
    pub const NONE: Self = Self {
        temperature: false,
        humidity: false,
        battery: false,
    };

    /// True if at least one class is flagged.
    #[must_use]
    pub fn any(&self) -> bool {
        self.temperature || self.humidity || self.battery
    }
}

/// Most recent values of one sensor, each with the time it was observed.
///
/// Metrics that were never observed hold [`UNKNOWN_TEMPERATURE`] or
/// [`UNKNOWN_VALUE`] and have no timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorValues {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// When `temperature` was observed.
    pub temperature_at: Option<OffsetDateTime>,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// When `humidity` was observed.
    pub humidity_at: Option<OffsetDateTime>,
    /// Battery level in percent.
    pub battery: f32,
    /// When `battery` was observed.
    pub battery_at: Option<OffsetDateTime>,
    /// Battery voltage in volts, measured or derived from the percentage.
    pub voltage: f32,
    /// When `voltage` was observed.
    pub voltage_at: Option<OffsetDateTime>,
}

impl Default for SensorValues {
    fn default() -> Self {
        Self {
            temperature: UNKNOWN_TEMPERATURE,
            temperature_at: None,
            humidity: UNKNOWN_VALUE,
            humidity_at: None,
            battery: UNKNOWN_VALUE,
            battery_at: None,
            voltage: UNKNOWN_VALUE,
            voltage_at: None,
        }
    }
}

impl SensorValues {
    /// Current value of a metric.
    #[must_use]
    pub fn get(&self, metric: Metric) -> f32 {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Battery => self.battery,
            Metric::Voltage => self.voltage,
        }
    }

    /// Observation time of a metric, if it was ever observed.
    #[must_use]
    pub fn observed_at(&self, metric: Metric) -> Option<OffsetDateTime> {
        match metric {
            Metric::Temperature => self.temperature_at,
            Metric::Humidity => self.humidity_at,
            Metric::Battery => self.battery_at,
            Metric::Voltage => self.voltage_at,
        }
    }

    /// Time elapsed since a metric was observed.
    ///
    /// Returns `None` for metrics never observed. Clock skew that would
    /// produce a negative age yields zero.
    #[must_use]
    pub fn age(&self, metric: Metric, now: OffsetDateTime) -> Option<Duration> {
        self.observed_at(metric)
            .map(|at| Duration::try_from(now - at).unwrap_or(Duration::ZERO))
    }

    /// Store a decoded advertisement record observed at `at`.
    ///
    /// Returns the metric classes the record carried.
    pub fn apply_record(&mut self, record: &Record, at: OffsetDateTime) -> ChangedMetrics {
        let mut touched = ChangedMetrics::NONE;
        match *record {
            Record::Temperature(temperature) => {
                self.set_temperature(temperature, at);
                touched.temperature = true;
            }
            Record::Humidity(humidity) => {
                self.set_humidity(humidity, at);
                touched.humidity = true;
            }
            Record::Battery(percent) => {
                self.battery = f32::from(percent);
                self.battery_at = Some(at);
                self.voltage = record.derived_voltage().unwrap_or(UNKNOWN_VALUE);
                self.voltage_at = Some(at);
                touched.battery = true;
            }
            Record::TemperatureHumidity {
                temperature,
                humidity,
            } => {
                self.set_temperature(temperature, at);
                self.set_humidity(humidity, at);
                touched.temperature = true;
                touched.humidity = true;
            }
        }
        touched
    }

    /// Store a reading received over an active GATT connection.
    pub fn apply_gatt(&mut self, reading: &GattReading, at: OffsetDateTime) -> ChangedMetrics {
        self.set_temperature(reading.temperature, at);
        self.set_humidity(reading.humidity, at);
        self.voltage = reading.voltage;
        self.voltage_at = Some(at);
        ChangedMetrics {
            temperature: true,
            humidity: true,
            battery: true,
        }
    }

    fn set_temperature(&mut self, value: f32, at: OffsetDateTime) {
        self.temperature = value;
        self.temperature_at = Some(at);
    }

    fn set_humidity(&mut self, value: f32, at: OffsetDateTime) {
        self.humidity = value;
        self.humidity_at = Some(at);
    }
}
