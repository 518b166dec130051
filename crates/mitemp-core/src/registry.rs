//! Registered sensors and their per-device state.
//!
//! Entries live in an arena addressed by [`DeviceHandle`] and are never
//! removed. Address and alias lookups go through secondary indexes that keep
//! the first registration for a given key, so duplicate registrations are
//! stored but shadowed.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use time::OffsetDateTime;

use mitemp_types::{BindKey, DeviceAddress, SensorModel, SensorValues};

use crate::error::{Error, Result};
use crate::freshness::{DebounceIntervals, NotifyDeadlines, deadline_after};

/// Stable index of a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(usize);

impl DeviceHandle {
    /// Registration order of the device, starting at zero.
    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Static configuration of one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRegistration {
    /// Link-layer address, the device identity.
    pub address: DeviceAddress,
    /// Human readable name.
    pub alias: Option<String>,
    /// Sensor model, which selects the advertisement dialect.
    pub model: SensorModel,
    /// Bind key for encrypted advertisements.
    pub key: Option<BindKey>,
    /// Interval between active refreshes. Zero means passive only.
    pub refresh_interval: Duration,
    /// Notification debounce per metric class.
    pub debounce: DebounceIntervals,
}

impl DeviceRegistration {
    /// Create a passive-only registration with default debounce.
    pub fn new(address: DeviceAddress, model: SensorModel) -> Self {
        Self {
            address,
            alias: None,
            model,
            key: None,
            refresh_interval: Duration::ZERO,
            debounce: DebounceIntervals::default(),
        }
    }

    /// Set the alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Set the bind key.
    #[must_use]
    pub fn key(mut self, key: BindKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Set the active refresh interval.
    #[must_use]
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the debounce intervals.
    #[must_use]
    pub fn debounce(mut self, debounce: DebounceIntervals) -> Self {
        self.debounce = debounce;
        self
    }

    /// Whether the scheduler may ever connect to this device.
    #[must_use]
    pub fn is_actively_polled(&self) -> bool {
        !self.refresh_interval.is_zero() && self.model.supports_active_poll()
    }

    /// Name used in logs and reports: the alias, or the address.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| self.address.to_string())
    }
}

/// A registered device and everything tracked about it.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    /// Static configuration.
    pub registration: DeviceRegistration,
    /// Latest value of each metric.
    pub values: SensorValues,
    /// When any advertisement from this device was last seen.
    pub last_advertisement: Option<OffsetDateTime>,
    /// When an active refresh becomes eligible. `None` means never.
    pub next_refresh: Option<OffsetDateTime>,
    /// Notification debounce state.
    pub notify: NotifyDeadlines,
}

impl DeviceEntry {
    fn new(registration: DeviceRegistration, next_refresh: Option<OffsetDateTime>) -> Self {
        Self {
            registration,
            values: SensorValues::default(),
            last_advertisement: None,
            next_refresh,
            notify: NotifyDeadlines::default(),
        }
    }

    /// Whether the refresh deadline has been reached.
    #[must_use]
    pub fn refresh_due(&self, now: OffsetDateTime) -> bool {
        self.next_refresh.is_some_and(|deadline| deadline <= now)
    }
}

/// Identifies a device by address or alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Match the link-layer address.
    Address(DeviceAddress),
    /// Match the alias exactly.
    Alias(String),
}

impl From<DeviceAddress> for DeviceSelector {
    fn from(address: DeviceAddress) -> Self {
        Self::Address(address)
    }
}

impl From<&str> for DeviceSelector {
    fn from(alias: &str) -> Self {
        Self::Alias(alias.to_string())
    }
}

impl FromStr for DeviceSelector {
    type Err = std::convert::Infallible;

    /// Anything that parses as an address is an address; the rest is an alias.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.parse::<DeviceAddress>() {
            Ok(address) => Self::Address(address),
            Err(_) => Self::Alias(s.to_string()),
        })
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => write!(f, "{}", address),
            Self::Alias(alias) => f.write_str(alias),
        }
    }
}

/// Arena of registered devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    entries: Vec<DeviceEntry>,
    by_address: HashMap<DeviceAddress, DeviceHandle>,
    by_alias: HashMap<String, DeviceHandle>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device.
    ///
    /// Actively polled devices get an initial refresh deadline of
    /// `now + index * stagger`, so that many devices do not all try to
    /// connect on the first tick.
    pub fn register(
        &mut self,
        registration: DeviceRegistration,
        now: OffsetDateTime,
        stagger: Duration,
    ) -> DeviceHandle {
        let handle = DeviceHandle(self.entries.len());

        let next_refresh = registration.is_actively_polled().then(|| {
            let offset = stagger.saturating_mul(u32::try_from(handle.0).unwrap_or(u32::MAX));
            deadline_after(now, offset)
        });

        self.by_address
            .entry(registration.address)
            .or_insert(handle);
        if let Some(alias) = &registration.alias {
            self.by_alias.entry(alias.clone()).or_insert(handle);
        }

        self.entries.push(DeviceEntry::new(registration, next_refresh));
        handle
    }

    /// Find the first device registered with `address`.
    pub fn find_by_address(&self, address: &DeviceAddress) -> Option<DeviceHandle> {
        self.by_address.get(address).copied()
    }

    /// Find the first device registered with `alias`.
    pub fn find_by_alias(&self, alias: &str) -> Option<DeviceHandle> {
        self.by_alias.get(alias).copied()
    }

    /// Resolve a selector to a handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`] if nothing matches.
    pub fn resolve(&self, selector: &DeviceSelector) -> Result<DeviceHandle> {
        let found = match selector {
            DeviceSelector::Address(address) => self.find_by_address(address),
            DeviceSelector::Alias(alias) => self.find_by_alias(alias),
        };
        found.ok_or_else(|| Error::NotRegistered(selector.to_string()))
    }

    /// Look up an entry.
    pub fn get(&self, handle: DeviceHandle) -> Option<&DeviceEntry> {
        self.entries.get(handle.0)
    }

    /// Look up an entry for mutation.
    pub fn get_mut(&mut self, handle: DeviceHandle) -> Option<&mut DeviceEntry> {
        self.entries.get_mut(handle.0)
    }

    /// Make a device eligible for an active refresh right away.
    ///
    /// This only rearms the deadline; a connection already in progress is not
    /// interrupted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotRegistered`] if nothing matches.
    pub fn force_refresh(
        &mut self,
        selector: &DeviceSelector,
        now: OffsetDateTime,
    ) -> Result<DeviceHandle> {
        let handle = self.resolve(selector)?;
        if let Some(entry) = self.entries.get_mut(handle.0) {
            entry.next_refresh = Some(now);
        }
        Ok(handle)
    }

    /// Iterate over entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (DeviceHandle, &DeviceEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (DeviceHandle(index), entry))
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(secs)
    }

    fn addr(last: u8) -> DeviceAddress {
        DeviceAddress::new([0xA4, 0xC1, 0x38, 0x00, 0x00, last])
    }

    fn polled(last: u8) -> DeviceRegistration {
        DeviceRegistration::new(addr(last), SensorModel::Lywsd03mmc)
            .refresh_interval(Duration::from_secs(180))
    }

    #[test]
    fn test_initial_deadlines_are_staggered() {
        let mut registry = DeviceRegistry::new();
        let stagger = Duration::from_secs(30);
        let a = registry.register(polled(1), at(100), stagger);
        let b = registry.register(polled(2), at(100), stagger);
        let c = registry.register(polled(3), at(100), stagger);

        assert_eq!(registry.get(a).unwrap().next_refresh, Some(at(100)));
        assert_eq!(registry.get(b).unwrap().next_refresh, Some(at(130)));
        assert_eq!(registry.get(c).unwrap().next_refresh, Some(at(160)));
    }

    #[test]
    fn test_huge_stagger_saturates() {
        let mut registry = DeviceRegistry::new();
        let a = registry.register(polled(1), at(0), Duration::MAX);
        let b = registry.register(polled(2), at(0), Duration::MAX);

        assert_eq!(registry.get(a).unwrap().next_refresh, Some(at(0)));
        assert!(!registry.get(b).unwrap().refresh_due(at(1_000_000_000)));
    }

    #[test]
    fn test_passive_devices_are_never_scheduled() {
        let mut registry = DeviceRegistry::new();
        let stagger = Duration::from_secs(30);
        let passive = registry.register(
            DeviceRegistration::new(addr(1), SensorModel::Lywsd03mmc),
            at(0),
            stagger,
        );
        let plaintext = registry.register(
            DeviceRegistration::new(addr(2), SensorModel::Lywsdcgq)
                .refresh_interval(Duration::from_secs(60)),
            at(0),
            stagger,
        );

        assert_eq!(registry.get(passive).unwrap().next_refresh, None);
        assert_eq!(registry.get(plaintext).unwrap().next_refresh, None);
    }

    #[test]
    fn test_new_entry_state() {
        let mut registry = DeviceRegistry::new();
        let handle = registry.register(polled(1), at(0), Duration::ZERO);
        let entry = registry.get(handle).unwrap();
        assert_eq!(entry.values, SensorValues::default());
        assert!(entry.last_advertisement.is_none());
        assert_eq!(entry.notify, NotifyDeadlines::default());
    }

    #[test]
    fn test_lookup_by_address_and_alias() {
        let mut registry = DeviceRegistry::new();
        let handle = registry.register(polled(1).alias("Square"), at(0), Duration::ZERO);

        assert_eq!(registry.find_by_address(&addr(1)), Some(handle));
        assert_eq!(registry.find_by_alias("Square"), Some(handle));
        assert_eq!(registry.find_by_alias("square"), None);
        assert_eq!(registry.find_by_address(&addr(9)), None);
    }

    #[test]
    fn test_duplicates_resolve_to_first_registration() {
        let mut registry = DeviceRegistry::new();
        let first = registry.register(polled(1).alias("Kitchen"), at(0), Duration::ZERO);
        let second = registry.register(polled(1).alias("Other"), at(0), Duration::ZERO);
        let third = registry.register(polled(2).alias("Kitchen"), at(0), Duration::ZERO);

        assert_eq!(registry.len(), 3);
        assert_ne!(first, second);
        assert_eq!(registry.find_by_address(&addr(1)), Some(first));
        assert_eq!(registry.find_by_alias("Kitchen"), Some(first));
        assert_eq!(registry.find_by_alias("Other"), Some(second));
        assert_eq!(registry.find_by_address(&addr(2)), Some(third));
    }

    #[test]
    fn test_force_refresh() {
        let mut registry = DeviceRegistry::new();
        let handle = registry.register(
            DeviceRegistration::new(addr(1), SensorModel::Lywsd03mmc).alias("Square"),
            at(0),
            Duration::ZERO,
        );
        assert!(!registry.get(handle).unwrap().refresh_due(at(50)));

        let forced = registry
            .force_refresh(&DeviceSelector::from("Square"), at(50))
            .unwrap();
        assert_eq!(forced, handle);
        assert!(registry.get(handle).unwrap().refresh_due(at(50)));
    }

    #[test]
    fn test_force_refresh_unknown() {
        let mut registry = DeviceRegistry::new();
        let err = registry
            .force_refresh(&DeviceSelector::from("Nowhere"), at(0))
            .unwrap_err();
        assert!(matches!(err, Error::NotRegistered(name) if name == "Nowhere"));
    }

    #[test]
    fn test_selector_from_str() {
        let selector: DeviceSelector = "A4:C1:38:00:00:01".parse().unwrap();
        assert_eq!(selector, DeviceSelector::Address(addr(1)));

        let selector: DeviceSelector = "Bedroom".parse().unwrap();
        assert_eq!(selector, DeviceSelector::Alias("Bedroom".into()));
    }

    #[test]
    fn test_display_name_falls_back_to_address() {
        let registration = DeviceRegistration::new(addr(1), SensorModel::Lywsdcgq);
        assert_eq!(registration.display_name(), "A4:C1:38:00:00:01");
        assert_eq!(registration.alias("Round").display_name(), "Round");
    }
}
