//! Gateway configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mitemp_core::{
    DebounceIntervals, DeviceAddress, DeviceRegistration, GatewayOptions, LinkOptions,
    PollerOptions, ScanOptions,
};
use mitemp_types::{BindKey, SensorModel};
use serde::{Deserialize, Serialize};

/// Gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Passive scan duty cycle.
    pub scan: ScanConfig,
    /// Active link settings.
    pub link: LinkConfig,
    /// Sensors to listen for.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// This checks:
    /// - Scheduler timeout, proximity window and tick interval are nonzero
    /// - Scan windows are nonzero
    /// - Device addresses, models and keys parse
    /// - Keys are only given for models that advertise encrypted frames
    /// - No duplicate device addresses
    ///
    /// # Example
    ///
    /// ```
    /// use mitemp_gw::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.scheduler.validate());
        errors.extend(self.scan.validate());
        errors.extend(self.link.validate());

        let mut seen_addresses = HashSet::new();
        for (i, device) in self.devices.iter().enumerate() {
            let prefix = format!("devices[{}]", i);
            errors.extend(device.validate(&prefix));

            if let Ok(address) = device.address.parse::<DeviceAddress>()
                && !seen_addresses.insert(address)
            {
                errors.push(ValidationError {
                    field: format!("{}.address", prefix),
                    message: format!("duplicate device address '{}'", device.address),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Build device registrations, in file order.
    ///
    /// Call [`Config::validate`] first; this fails on the first device that
    /// does not parse.
    pub fn registrations(&self) -> Result<Vec<DeviceRegistration>, ConfigError> {
        self.devices
            .iter()
            .enumerate()
            .map(|(i, device)| {
                device.registration().map_err(|e| {
                    ConfigError::Validation(vec![ValidationError {
                        field: format!("devices[{}]", i),
                        message: e.to_string(),
                    }])
                })
            })
            .collect()
    }
}

/// Connection scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Give up on a connection that delivers no data after this long.
    pub connection_timeout_secs: u64,
    /// Only connect to devices that advertised within this window.
    pub proximity_window_secs: u64,
    /// Scheduler tick period.
    pub tick_interval_ms: u64,
    /// Period of the status report log, 0 disables it.
    pub report_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: 15,
            proximity_window_secs: 30,
            tick_interval_ms: 1000,
            report_interval_secs: 60,
        }
    }
}

impl SchedulerConfig {
    /// Validate scheduler configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.connection_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "scheduler.connection_timeout_secs".to_string(),
                message: "connection timeout cannot be 0".to_string(),
            });
        }
        if self.proximity_window_secs == 0 {
            errors.push(ValidationError {
                field: "scheduler.proximity_window_secs".to_string(),
                message: "proximity window cannot be 0, no device would ever be refreshed"
                    .to_string(),
            });
        }
        if self.tick_interval_ms == 0 {
            errors.push(ValidationError {
                field: "scheduler.tick_interval_ms".to_string(),
                message: "tick interval cannot be 0".to_string(),
            });
        }

        errors
    }

    /// Scheduler options for the sensor hub.
    pub fn poller_options(&self) -> PollerOptions {
        PollerOptions::new()
            .connection_timeout(Duration::from_secs(self.connection_timeout_secs))
            .proximity_window(Duration::from_secs(self.proximity_window_secs))
    }

    /// Event loop options; a zero report interval disables the report.
    pub fn gateway_options(&self) -> GatewayOptions {
        let report = (self.report_interval_secs > 0)
            .then(|| Duration::from_secs(self.report_interval_secs));
        GatewayOptions::new()
            .tick_interval(Duration::from_millis(self.tick_interval_ms))
            .report_interval(report)
    }
}

/// Passive scan configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Length of one scan window.
    pub scan_duration_secs: u64,
    /// Gap between scan windows.
    pub scan_pause_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_duration_secs: 6,
            scan_pause_secs: 1,
        }
    }
}

impl ScanConfig {
    /// Validate scan configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.scan_duration_secs == 0 {
            errors.push(ValidationError {
                field: "scan.scan_duration_secs".to_string(),
                message: "scan window cannot be 0".to_string(),
            });
        }

        errors
    }

    /// Duty cycle for the passive scanner.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::new()
            .scan_duration(Duration::from_secs(self.scan_duration_secs))
            .scan_pause(Duration::from_secs(self.scan_pause_secs))
    }
}

/// Active link configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Upper bound for connecting and discovering services.
    pub connect_timeout_secs: u64,
    /// Ask sensors for a 500 ms connection interval after connecting.
    pub write_comm_interval: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        let defaults = LinkOptions::default();
        Self {
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            write_comm_interval: defaults.write_comm_interval,
        }
    }
}

impl LinkConfig {
    /// Validate link configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.connect_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "link.connect_timeout_secs".to_string(),
                message: "connect timeout cannot be 0".to_string(),
            });
        }

        errors
    }

    /// Options for the active GATT link.
    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            write_comm_interval: self.write_comm_interval,
        }
    }
}

/// Configuration for one sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Bluetooth address, `AA:BB:CC:DD:EE:FF`.
    pub address: String,
    /// Friendly alias for the device.
    #[serde(default)]
    pub alias: Option<String>,
    /// `lywsdcgq` or `lywsd03mmc`.
    pub model: String,
    /// Bind key as 32 hex characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Connect for a fresh reading this often, 0 disables active refresh.
    #[serde(default)]
    pub refresh_interval_secs: u64,
    /// Minimum gap between notifications for the same metric.
    #[serde(default = "default_debounce")]
    pub debounce_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_temperature_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_humidity_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debounce_battery_secs: Option<u64>,
}

fn default_debounce() -> u64 {
    10
}

impl DeviceConfig {
    /// Validate device configuration.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(e) = self.address.parse::<DeviceAddress>() {
            errors.push(ValidationError {
                field: format!("{}.address", prefix),
                message: e.to_string(),
            });
        }

        if let Some(alias) = &self.alias
            && alias.is_empty()
        {
            errors.push(ValidationError {
                field: format!("{}.alias", prefix),
                message: "alias cannot be empty string (use null/omit instead)".to_string(),
            });
        }

        let model = match self.model.parse::<SensorModel>() {
            Ok(model) => Some(model),
            Err(e) => {
                errors.push(ValidationError {
                    field: format!("{}.model", prefix),
                    message: e.to_string(),
                });
                None
            }
        };

        if let Some(key) = &self.key {
            if let Err(e) = key.parse::<BindKey>() {
                errors.push(ValidationError {
                    field: format!("{}.key", prefix),
                    message: e.to_string(),
                });
            }
            if model == Some(SensorModel::Lywsdcgq) {
                errors.push(ValidationError {
                    field: format!("{}.key", prefix),
                    message: format!("{} advertises plaintext and takes no key", self.model),
                });
            }
        }

        if self.refresh_interval_secs > 0 && model == Some(SensorModel::Lywsdcgq) {
            errors.push(ValidationError {
                field: format!("{}.refresh_interval_secs", prefix),
                message: format!("{} does not support active refresh", self.model),
            });
        }

        errors
    }

    /// Per-metric debounce intervals, overrides first.
    pub fn debounce(&self) -> DebounceIntervals {
        let secs = |over: Option<u64>| Duration::from_secs(over.unwrap_or(self.debounce_secs));
        DebounceIntervals {
            temperature: secs(self.debounce_temperature_secs),
            humidity: secs(self.debounce_humidity_secs),
            battery: secs(self.debounce_battery_secs),
        }
    }

    /// Build the registration for this device.
    pub fn registration(&self) -> Result<DeviceRegistration, mitemp_types::ParseError> {
        let address: DeviceAddress = self.address.parse()?;
        let model: SensorModel = self.model.parse()?;

        let mut registration = DeviceRegistration::new(address, model)
            .refresh_interval(Duration::from_secs(self.refresh_interval_secs))
            .debounce(self.debounce());
        if let Some(alias) = &self.alias {
            registration = registration.alias(alias.clone());
        }
        if let Some(key) = &self.key {
            registration = registration.key(key.parse()?);
        }
        Ok(registration)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `scheduler.tick_interval_ms` or `devices[0].key`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mitemp")
        .join("gateway.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0102030405060708090a0b0c0d0e0f10";

    fn square() -> DeviceConfig {
        DeviceConfig {
            address: "A4:C1:38:01:02:03".to_string(),
            alias: Some("Square".to_string()),
            model: "lywsd03mmc".to_string(),
            key: Some(KEY.to_string()),
            refresh_interval_secs: 180,
            debounce_secs: 10,
            debounce_temperature_secs: None,
            debounce_humidity_secs: None,
            debounce_battery_secs: None,
        }
    }

    fn round() -> DeviceConfig {
        DeviceConfig {
            address: "58:2D:34:10:20:30".to_string(),
            alias: Some("Round".to_string()),
            model: "lywsdcgq".to_string(),
            key: None,
            refresh_interval_secs: 0,
            debounce_secs: 10,
            debounce_temperature_secs: None,
            debounce_humidity_secs: None,
            debounce_battery_secs: None,
        }
    }

    fn messages(config: &Config) -> Vec<String> {
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                errors.iter().map(ToString::to_string).collect()
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.scheduler.connection_timeout_secs, 15);
        assert_eq!(config.scheduler.proximity_window_secs, 30);
        assert_eq!(config.scheduler.tick_interval_ms, 1000);
        assert_eq!(config.scan.scan_duration_secs, 6);
        assert_eq!(config.scan.scan_pause_secs, 1);
        assert_eq!(config.link.connect_timeout_secs, 10);
        assert!(!config.link.write_comm_interval);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_device_config_defaults() {
        let toml = r#"
            address = "58:2D:34:10:20:30"
            model = "lywsdcgq"
        "#;
        let config: DeviceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.alias, None);
        assert_eq!(config.key, None);
        assert_eq!(config.refresh_interval_secs, 0);
        assert_eq!(config.debounce_secs, 10);
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [scheduler]
            connection_timeout_secs = 20
            tick_interval_ms = 500

            [scan]
            scan_duration_secs = 8

            [link]
            write_comm_interval = true

            [[devices]]
            address = "A4:C1:38:01:02:03"
            alias = "Square"
            model = "lywsd03mmc"
            key = "0102030405060708090a0b0c0d0e0f10"
            refresh_interval_secs = 180
            debounce_battery_secs = 600

            [[devices]]
            address = "58:2D:34:10:20:30"
            model = "LYWSDCGQ"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.scheduler.connection_timeout_secs, 20);
        assert_eq!(config.scheduler.proximity_window_secs, 30);
        assert_eq!(config.scan.scan_duration_secs, 8);
        assert_eq!(config.scan.scan_pause_secs, 1);
        assert!(config.link.write_comm_interval);
        assert_eq!(config.devices.len(), 2);

        let registrations = config.registrations().unwrap();
        assert_eq!(registrations[0].model, SensorModel::Lywsd03mmc);
        assert_eq!(registrations[0].alias.as_deref(), Some("Square"));
        assert!(registrations[0].key.is_some());
        assert_eq!(registrations[0].refresh_interval, Duration::from_secs(180));
        assert_eq!(registrations[0].debounce.battery, Duration::from_secs(600));
        assert_eq!(registrations[0].debounce.humidity, Duration::from_secs(10));
        assert_eq!(registrations[1].model, SensorModel::Lywsdcgq);
        assert!(!registrations[1].is_actively_polled());
    }

    #[test]
    fn test_options_follow_config() {
        let config = Config::default();
        let poller = config.scheduler.poller_options();
        assert_eq!(poller.connection_timeout, Duration::from_secs(15));
        assert_eq!(poller.proximity_window, Duration::from_secs(30));

        let gateway = config.scheduler.gateway_options();
        assert_eq!(gateway.tick_interval, Duration::from_secs(1));
        assert_eq!(gateway.report_interval, Some(Duration::from_secs(60)));

        let scheduler = SchedulerConfig {
            report_interval_secs: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(scheduler.gateway_options().report_interval, None);

        let scan = config.scan.scan_options();
        assert_eq!(scan.scan_duration, Duration::from_secs(6));
        assert_eq!(scan.scan_pause, Duration::from_secs(1));

        assert_eq!(config.link.link_options(), LinkOptions::default());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("gateway.toml");

        let config = Config {
            devices: vec![square(), round()],
            ..Config::default()
        };

        config.save(&config_path).unwrap();
        let loaded = Config::load_validated(&config_path).unwrap();

        assert_eq!(loaded.scheduler, config.scheduler);
        assert_eq!(loaded.devices, config.devices);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/gateway.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("mitemp/gateway.toml"));
    }

    // ==========================================================================
    // Validation tests
    // ==========================================================================

    #[test]
    fn test_zero_timeouts_rejected() {
        let config = Config {
            scheduler: SchedulerConfig {
                connection_timeout_secs: 0,
                tick_interval_ms: 0,
                ..SchedulerConfig::default()
            },
            link: LinkConfig {
                connect_timeout_secs: 0,
                write_comm_interval: false,
            },
            ..Config::default()
        };

        let errors = messages(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("connection_timeout_secs")));
        assert!(errors.iter().any(|e| e.contains("tick_interval_ms")));
        assert!(errors.iter().any(|e| e.contains("link.connect_timeout_secs")));
    }

    #[test]
    fn test_zero_proximity_window_rejected() {
        let config = Config {
            scheduler: SchedulerConfig {
                proximity_window_secs: 0,
                ..SchedulerConfig::default()
            },
            ..Config::default()
        };

        let errors = messages(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("scheduler.proximity_window_secs"));
    }

    #[test]
    fn test_valid_scheduler_gives_valid_poller_options() {
        let scheduler = SchedulerConfig {
            connection_timeout_secs: 1,
            proximity_window_secs: 1,
            ..SchedulerConfig::default()
        };
        assert!(scheduler.validate().is_empty());
        assert!(scheduler.poller_options().validate().is_ok());
    }

    #[test]
    fn test_huge_durations_are_accepted() {
        // Overlong spans saturate to "never" in the scheduler
        let config = Config {
            scheduler: SchedulerConfig {
                connection_timeout_secs: u64::MAX,
                proximity_window_secs: u64::MAX,
                tick_interval_ms: u64::MAX,
                report_interval_secs: u64::MAX,
            },
            devices: vec![DeviceConfig {
                refresh_interval_secs: u64::MAX,
                debounce_secs: u64::MAX,
                ..square()
            }],
            ..Config::default()
        };
        config.validate().unwrap();
        assert_eq!(config.registrations().unwrap().len(), 1);
        assert!(config.scheduler.poller_options().validate().is_ok());
        assert_eq!(
            config.scheduler.gateway_options().tick_interval,
            Duration::from_millis(u64::MAX)
        );
    }

    #[test]
    fn test_valid_devices() {
        assert!(square().validate("devices[0]").is_empty());
        assert!(round().validate("devices[1]").is_empty());
    }

    #[test]
    fn test_device_field_errors() {
        let bad_address = DeviceConfig {
            address: "not-an-address".to_string(),
            ..square()
        };
        let errors = bad_address.validate("devices[0]");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "devices[0].address");

        let bad_model = DeviceConfig {
            model: "lywsd02".to_string(),
            key: None,
            ..square()
        };
        let errors = bad_model.validate("devices[0]");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "devices[0].model");

        let short_key = DeviceConfig {
            key: Some("0102".to_string()),
            ..square()
        };
        let errors = short_key.validate("devices[0]");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "devices[0].key");

        let empty_alias = DeviceConfig {
            alias: Some(String::new()),
            ..square()
        };
        let errors = empty_alias.validate("devices[0]");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty string"));
    }

    #[test]
    fn test_plaintext_model_rejects_key_and_refresh() {
        let device = DeviceConfig {
            key: Some(KEY.to_string()),
            refresh_interval_secs: 60,
            ..round()
        };
        let errors = device.validate("devices[0]");
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.field == "devices[0].key"));
        assert!(
            errors
                .iter()
                .any(|e| e.field == "devices[0].refresh_interval_secs")
        );
    }

    #[test]
    fn test_duplicate_addresses_case_insensitive() {
        let config = Config {
            devices: vec![
                square(),
                DeviceConfig {
                    address: "a4:c1:38:01:02:03".to_string(),
                    alias: Some("Other".to_string()),
                    ..square()
                },
            ],
            ..Config::default()
        };

        let errors = messages(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("duplicate"));
    }

    #[test]
    fn test_all_errors_collected() {
        let config = Config {
            scheduler: SchedulerConfig {
                tick_interval_ms: 0,
                ..SchedulerConfig::default()
            },
            devices: vec![
                DeviceConfig {
                    address: "bogus".to_string(),
                    ..round()
                },
                DeviceConfig {
                    key: Some("zz".to_string()),
                    ..square()
                },
            ],
            ..Config::default()
        };

        let errors = messages(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors[1].starts_with("devices[0].address"));
        assert!(errors[2].starts_with("devices[1].key"));
    }

    #[test]
    fn test_debounce_overrides() {
        let device = DeviceConfig {
            debounce_secs: 30,
            debounce_temperature_secs: Some(5),
            ..square()
        };
        let debounce = device.debounce();
        assert_eq!(debounce.temperature, Duration::from_secs(5));
        assert_eq!(debounce.humidity, Duration::from_secs(30));
        assert_eq!(debounce.battery, Duration::from_secs(30));
    }

    #[test]
    fn test_config_validation_error_display() {
        let error = ConfigError::Validation(vec![
            ValidationError {
                field: "scheduler.tick_interval_ms".to_string(),
                message: "tick interval cannot be 0".to_string(),
            },
            ValidationError {
                field: "devices[0].address".to_string(),
                message: "invalid".to_string(),
            },
        ]);
        let display = format!("{}", error);
        assert!(display.contains("  - scheduler.tick_interval_ms: tick interval cannot be 0"));
        assert!(display.contains("devices[0].address"));
    }
}
