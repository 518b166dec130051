//! Logging listener.

use mitemp_core::{DataEvent, DataSource, SensorListener};
use tracing::info;

/// Logs every reported change at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl SensorListener for LogListener {
    fn on_data(&self, event: &DataEvent<'_>) {
        info!("{}", describe(event));
    }
}

/// One-line summary of the metrics an event reports.
pub fn describe(event: &DataEvent<'_>) -> String {
    let mut parts = Vec::new();
    if event.changes.temperature {
        parts.push(format!("{:.1} °C", event.values.temperature));
    }
    if event.changes.humidity {
        parts.push(format!("{:.1} %", event.values.humidity));
    }
    if event.changes.battery {
        if event.values.battery >= 0.0 {
            parts.push(format!("battery {:.0} %", event.values.battery));
        }
        parts.push(format!("{:.3} V", event.values.voltage));
    }

    let source = match event.source {
        DataSource::Advertisement => "adv",
        DataSource::Connection => "gatt",
    };
    let name = event
        .alias
        .map(str::to_string)
        .unwrap_or_else(|| event.address.to_string());
    format!("{} [{}]: {}", name, source, parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mitemp_core::{ChangedMetrics, DeviceAddress, SensorValues};

    fn address() -> DeviceAddress {
        "A4:C1:38:01:02:03".parse().unwrap()
    }

    #[test]
    fn test_describe_advertised_humidity() {
        let values = SensorValues {
            humidity: 45.3,
            ..SensorValues::default()
        };
        let event = DataEvent {
            address: address(),
            alias: Some("Square"),
            changes: ChangedMetrics {
                humidity: true,
                ..ChangedMetrics::default()
            },
            values: &values,
            source: DataSource::Advertisement,
        };
        assert_eq!(describe(&event), "Square [adv]: 45.3 %");
    }

    #[test]
    fn test_describe_gatt_reading_without_alias() {
        // A GATT reading carries voltage but no battery percentage
        let values = SensorValues {
            temperature: 21.5,
            humidity: 55.0,
            voltage: 3.001,
            ..SensorValues::default()
        };
        let event = DataEvent {
            address: address(),
            alias: None,
            changes: ChangedMetrics {
                temperature: true,
                humidity: true,
                battery: true,
            },
            values: &values,
            source: DataSource::Connection,
        };
        assert_eq!(
            describe(&event),
            "A4:C1:38:01:02:03 [gatt]: 21.5 °C, 55.0 %, 3.001 V"
        );
    }
}
