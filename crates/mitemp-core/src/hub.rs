//! The sensor hub: registry, decoding, debounce, fan-out and scheduling.
//!
//! [`SensorHub`] owns every piece of mutable state. Advertisements and GATT
//! notifications are applied through `&mut self`, so each update of a
//! device's values, deadlines and timestamps happens as one unit.

use std::fmt::Write as _;

use time::OffsetDateTime;
use tracing::{debug, trace};
use uuid::Uuid;

use mitemp_types::uuids::MIBEACON_SERVICE;
use mitemp_types::{ChangedMetrics, DeviceAddress, GattReading, Metric, SensorValues};

use crate::advertisement::decode_service_data;
use crate::crypto::{AesCcmCipher, PayloadCipher};
use crate::error::{Error, Result};
use crate::events::{DataEvent, DataSource, Listeners, SensorListener};
use crate::poller::{ConnectionState, Poller, PollerOptions, TickOutcome};
use crate::registry::{DeviceEntry, DeviceHandle, DeviceRegistration, DeviceRegistry, DeviceSelector};
use crate::traits::{ScanControl, SensorLink};

/// Registered sensors and everything that acts on them.
pub struct SensorHub {
    registry: DeviceRegistry,
    listeners: Listeners,
    poller: Poller,
    cipher: Box<dyn PayloadCipher>,
}

impl SensorHub {
    /// Create a hub with the AES-CCM cipher.
    pub fn new(options: PollerOptions) -> Self {
        Self::with_cipher(options, Box::new(AesCcmCipher))
    }

    /// Create a hub with a custom cipher.
    pub fn with_cipher(options: PollerOptions, cipher: Box<dyn PayloadCipher>) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            listeners: Listeners::new(),
            poller: Poller::new(options),
            cipher,
        }
    }

    /// Register a device.
    pub fn register(&mut self, registration: DeviceRegistration, now: OffsetDateTime) -> DeviceHandle {
        let stagger = self.poller.options().stagger();
        debug!(
            "Registering {} ({}, {})",
            registration.display_name(),
            registration.address,
            registration.model
        );
        self.registry.register(registration, now, stagger)
    }

    /// Add a listener. Listeners are called in the order they were added.
    pub fn add_listener(&mut self, listener: impl SensorListener + 'static) {
        self.listeners.add(listener);
    }

    /// Registered devices.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// The active refresh scheduler.
    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// State of the active connection.
    pub fn connection_state(&self) -> ConnectionState {
        self.poller.state()
    }

    /// Apply one service data element of an advertisement.
    ///
    /// Any advertisement from a registered device counts as a proximity
    /// signal, even if it carries nothing we decode. Returns the metric
    /// classes that were reported to listeners.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownDevice`] if `address` is not registered.
    /// - [`Error::MalformedFrame`] or [`Error::Decryption`] if the frame was
    ///   dropped. Stored values are untouched in that case.
    pub fn handle_advertisement(
        &mut self,
        address: DeviceAddress,
        service_uuid: Uuid,
        service_data: &[u8],
        now: OffsetDateTime,
    ) -> Result<ChangedMetrics> {
        let handle = self
            .registry
            .find_by_address(&address)
            .ok_or(Error::UnknownDevice(address))?;
        let Some(entry) = self.registry.get_mut(handle) else {
            return Err(Error::UnknownDevice(address));
        };

        entry.last_advertisement = Some(now);

        if service_uuid != MIBEACON_SERVICE {
            return Ok(ChangedMetrics::NONE);
        }

        let registration = &entry.registration;
        let record = decode_service_data(
            registration.model.dialect(),
            service_data,
            registration.key.as_ref(),
            self.cipher.as_ref(),
        )?;
        let Some(record) = record else {
            trace!("Ignoring unknown record from {}", address);
            return Ok(ChangedMetrics::NONE);
        };

        let touched = entry.values.apply_record(&record, now);
        Ok(publish(entry, &self.listeners, touched, DataSource::Advertisement, now))
    }

    /// Apply a notification received over the active connection.
    ///
    /// Notifications are attributed to the device the scheduler connected to.
    /// Without an open session the payload is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] if the payload is too short; the
    /// session stays open until it times out.
    pub fn handle_gatt_notification(
        &mut self,
        payload: &[u8],
        now: OffsetDateTime,
    ) -> Result<ChangedMetrics> {
        let Some(session) = self.poller.session().copied() else {
            trace!("Ignoring notification outside of a connection");
            return Ok(ChangedMetrics::NONE);
        };

        let reading = GattReading::from_bytes(payload)?;
        let Some(entry) = self.registry.get_mut(session.handle) else {
            return Err(Error::UnknownDevice(session.address));
        };

        debug!(
            "Received data for {}: temperature {:.1}, humidity {:.0}, voltage {:.3}",
            entry.registration.display_name(),
            reading.temperature,
            reading.humidity,
            reading.voltage
        );

        let touched = entry.values.apply_gatt(&reading, now);
        let flagged = publish(entry, &self.listeners, touched, DataSource::Connection, now);
        self.poller.mark_data_received();
        Ok(flagged)
    }

    /// Advance the active refresh scheduler.
    pub async fn tick(
        &mut self,
        scanner: &dyn ScanControl,
        link: &dyn SensorLink,
        now: OffsetDateTime,
    ) -> TickOutcome {
        self.poller.tick(&mut self.registry, scanner, link, now).await
    }

    /// Current values of a device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`] if nothing matches.
    pub fn values(&self, selector: &DeviceSelector) -> Result<&SensorValues> {
        let handle = self.registry.resolve(selector)?;
        self.registry
            .get(handle)
            .map(|entry| &entry.values)
            .ok_or_else(|| Error::NotRegistered(selector.to_string()))
    }

    /// Make a device eligible for an active refresh on the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`] if nothing matches.
    pub fn force_refresh(&mut self, selector: &DeviceSelector, now: OffsetDateTime) -> Result<()> {
        self.registry.force_refresh(selector, now).map(|_| ())
    }

    /// One report line for a device: `age, temperature, humidity, voltage`.
    ///
    /// Age is whole seconds since the temperature was observed, empty if it
    /// never was.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`] if nothing matches.
    pub fn status_line(&self, selector: &DeviceSelector, now: OffsetDateTime) -> Result<String> {
        let values = self.values(selector)?;
        Ok(format_values(values, now))
    }

    /// Report of every device, one `name, age, temperature, humidity, voltage`
    /// line each, in registration order.
    pub fn status_report(&self, now: OffsetDateTime) -> String {
        let mut report = String::new();
        for (_, entry) in self.registry.iter() {
            let _ = writeln!(
                report,
                "{}, {}",
                entry.registration.display_name(),
                format_values(&entry.values, now)
            );
        }
        report
    }
}

impl std::fmt::Debug for SensorHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorHub")
            .field("devices", &self.registry.len())
            .field("listeners", &self.listeners)
            .field("state", &self.poller.state())
            .finish()
    }
}

fn publish(
    entry: &mut DeviceEntry,
    listeners: &Listeners,
    touched: ChangedMetrics,
    source: DataSource,
    now: OffsetDateTime,
) -> ChangedMetrics {
    let flagged = entry
        .notify
        .gate(touched, &entry.registration.debounce, now);

    if flagged.any() {
        listeners.notify(&DataEvent {
            address: entry.registration.address,
            alias: entry.registration.alias.as_deref(),
            changes: flagged,
            values: &entry.values,
            source,
        });
    }
    flagged
}

fn format_values(values: &SensorValues, now: OffsetDateTime) -> String {
    let age = values
        .age(Metric::Temperature, now)
        .map(|age| age.as_secs().to_string())
        .unwrap_or_default();
    format!(
        "{}, {:.1}, {:.1}, {:.3}",
        age, values.temperature, values.humidity, values.voltage
    )
}
