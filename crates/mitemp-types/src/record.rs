//! MiBeacon object records and GATT readings.
//!
//! Both advertisement dialects carry the same record layout once framing is
//! removed:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | Discriminator (object id, low byte) |
//! | 1 | 1 | Object id, high byte (`0x10`) |
//! | 2 | 1 | Value length |
//! | 3.. | n | Value |
//!
//! Only the discriminator is interpreted; the high byte and length are
//! carried by the sensor but not trusted.

use bytes::Buf;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Discriminator for a temperature record.
pub const RECORD_TEMPERATURE: u8 = 0x04;
/// Discriminator for a humidity record.
pub const RECORD_HUMIDITY: u8 = 0x06;
/// Discriminator for a battery record.
pub const RECORD_BATTERY: u8 = 0x0A;
/// Discriminator for a combined temperature and humidity record.
pub const RECORD_TEMPERATURE_HUMIDITY: u8 = 0x0D;

/// Offset of the value inside a record.
const VALUE_OFFSET: usize = 3;

/// Minimum length of a GATT notification.
pub const MIN_GATT_READING_BYTES: usize = 5;

/// Battery voltage at 0 %.
const VOLTAGE_EMPTY: f32 = 2.1;

/// A decoded MiBeacon object record.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum Record {
    /// Temperature in degrees Celsius.
    Temperature(f32),
    /// Relative humidity in percent.
    Humidity(f32),
    /// Battery level in percent.
    Battery(u8),
    /// Temperature and humidity sampled together.
    TemperatureHumidity {
        /// Temperature in degrees Celsius.
        temperature: f32,
        /// Relative humidity in percent.
        humidity: f32,
    },
}

impl Record {
    /// Decode a record from its first byte onwards.
    ///
    /// Returns `Ok(None)` for discriminators this crate does not interpret.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if the record is empty or too
    /// short for the value its discriminator announces.
    ///
    /// # Examples
    ///
    /// ```
    /// use mitemp_types::Record;
    ///
    /// let record = Record::decode(&[0x0D, 0x10, 0x04, 0xC8, 0x00, 0x32, 0x01]).unwrap();
    /// assert_eq!(
    ///     record,
    ///     Some(Record::TemperatureHumidity { temperature: 20.0, humidity: 30.6 })
    /// );
    /// ```
    pub fn decode(record: &[u8]) -> ParseResult<Option<Self>> {
        let Some(&discriminator) = record.first() else {
            return Err(ParseError::InsufficientBytes {
                expected: 1,
                actual: 0,
            });
        };

        let value_len = match discriminator {
            RECORD_TEMPERATURE | RECORD_HUMIDITY => 2,
            RECORD_BATTERY => 1,
            RECORD_TEMPERATURE_HUMIDITY => 4,
            _ => return Ok(None),
        };

        let expected = VALUE_OFFSET + value_len;
        if record.len() < expected {
            return Err(ParseError::InsufficientBytes {
                expected,
                actual: record.len(),
            });
        }

        let mut buf = &record[VALUE_OFFSET..];
        let decoded = match discriminator {
            RECORD_TEMPERATURE => Record::Temperature(tenths(buf.get_i16_le())),
            RECORD_HUMIDITY => Record::Humidity(tenths_unsigned(buf.get_u16_le())),
            RECORD_BATTERY => Record::Battery(buf.get_u8()),
            _ => {
                let temperature = tenths(buf.get_i16_le());
                let humidity = tenths_unsigned(buf.get_u16_le());
                Record::TemperatureHumidity {
                    temperature,
                    humidity,
                }
            }
        };

        Ok(Some(decoded))
    }

    /// Battery voltage linearly mapped from the percentage (0 % = 2.1 V,
    /// 100 % = 3.1 V), for battery records only.
    #[must_use]
    pub fn derived_voltage(&self) -> Option<f32> {
        match self {
            Record::Battery(percent) => Some(VOLTAGE_EMPTY + f32::from(*percent) / 100.0),
            _ => None,
        }
    }
}

fn tenths(raw: i16) -> f32 {
    f32::from(raw) / 10.0
}

fn tenths_unsigned(raw: u16) -> f32 {
    f32::from(raw) / 10.0
}

/// A reading delivered by the LYWSD03MMC data characteristic notification.
///
/// The byte format is:
/// - bytes 0-1: Temperature (i16 LE, multiply by 0.01 for Celsius)
/// - byte 2: Humidity (u8, percent)
/// - bytes 3-4: Battery voltage (u16 LE, multiply by 0.001 for volts)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GattReading {
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Battery voltage in volts.
    pub voltage: f32,
}

impl GattReading {
    /// Parse a notification payload.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` contains fewer than
    /// [`MIN_GATT_READING_BYTES`] (5) bytes.
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        if data.len() < MIN_GATT_READING_BYTES {
            return Err(ParseError::InsufficientBytes {
                expected: MIN_GATT_READING_BYTES,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let temp_raw = buf.get_i16_le();
        let humidity = buf.get_u8();
        let voltage_raw = buf.get_u16_le();

        Ok(GattReading {
            temperature: f32::from(temp_raw) * 0.01,
            humidity: f32::from(humidity),
            voltage: f32::from(voltage_raw) * 0.001,
        })
    }
}


/// Property-based tests for record decoding.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Decoding random bytes should never panic.
        #[test]
        fn decode_never_panics(data: Vec<u8>) {
            let _ = Record::decode(&data);
        }

        /// Parsing random GATT payloads should never panic.
        #[test]
        fn gatt_reading_never_panics(data: Vec<u8>) {
            let _ = GattReading::from_bytes(&data);
        }

        /// Battery records always derive a voltage between 2.1 V and 4.65 V.
        #[test]
        fn battery_voltage_in_range(percent: u8) {
            let record = Record::decode(&[RECORD_BATTERY, 0x10, 0x01, percent]).unwrap().unwrap();
            let voltage = record.derived_voltage().unwrap();
            prop_assert!((2.1..=4.65).contains(&voltage));
        }
    }
}
