//! BLE gateway daemon for Xiaomi MiTemp thermometers.
//!
//! The gateway listens for MiBeacon advertisements from the configured
//! sensors, refreshes LYWSD03MMC sensors over GATT on a schedule, and logs
//! every reported change along with a periodic status report.
//!
//! # Configuration
//!
//! The gateway reads configuration from `~/.config/mitemp/gateway.toml`:
//!
//! ```toml
//! [scheduler]
//! connection_timeout_secs = 15
//! proximity_window_secs = 30
//! tick_interval_ms = 1000
//! report_interval_secs = 60
//!
//! [scan]
//! scan_duration_secs = 6
//! scan_pause_secs = 1
//!
//! [link]
//! connect_timeout_secs = 10
//! write_comm_interval = false
//!
//! [[devices]]
//! address = "A4:C1:38:01:02:03"
//! alias = "Square"
//! model = "lywsd03mmc"
//! key = "0102030405060708090a0b0c0d0e0f10"
//! refresh_interval_secs = 180
//!
//! [[devices]]
//! address = "58:2D:34:10:20:30"
//! alias = "Round"
//! model = "lywsdcgq"
//! debounce_secs = 30
//! ```

pub mod config;
pub mod listener;

pub use config::{
    Config, ConfigError, DeviceConfig, LinkConfig, ScanConfig, SchedulerConfig, ValidationError,
};
pub use listener::LogListener;
