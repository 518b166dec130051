//! Bluetooth UUIDs for MiTemp devices.
//!
//! This module contains the UUIDs needed to receive MiBeacon advertisements
//! and to talk to LYWSD03MMC sensors over GATT.

use uuid::{Uuid, uuid};

// --- Advertisement ---

/// Xiaomi MiBeacon service data UUID (16-bit `0xFE95`).
pub const MIBEACON_SERVICE: Uuid = uuid!("0000fe95-0000-1000-8000-00805f9b34fb");

// --- LYWSD03MMC GATT ---

/// LYWSD03MMC data service.
pub const LYWSD03MMC_SERVICE: Uuid = uuid!("ebe0ccb0-7a0a-4b0c-8a1a-6ff2997da3a6");

/// Temperature/humidity/voltage notification characteristic.
pub const LYWSD03MMC_DATA: Uuid = uuid!("ebe0ccc1-7a0a-4b0c-8a1a-6ff2997da3a6");

/// Connection communication interval characteristic.
pub const LYWSD03MMC_COMM_INTERVAL: Uuid = uuid!("ebe0ccd8-7a0a-4b0c-8a1a-6ff2997da3a6");

/// Communication interval value written to save battery (500 ms, u16 LE).
pub const COMM_INTERVAL_500MS: [u8; 2] = [0xF4, 0x01];
