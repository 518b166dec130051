//! Hardware integration tests for mitemp-core
//!
//! These tests require actual BLE hardware and should be run with:
//! ```
//! cargo test --package mitemp-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure devices via environment variables:
//! - `MITEMP_DEVICE`: address of a LYWSD03MMC sensor
//! - `MITEMP_KEY`: its 32-hex-digit bind key
//! - `MITEMP_LEGACY_DEVICE`: address of a LYWSDCGQ sensor
//!
//! Example:
//! ```
//! MITEMP_DEVICE="A4:C1:38:01:02:03" MITEMP_KEY="0102..." cargo test --package mitemp-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{Central, ScanFilter};
use mitemp_core::ble::get_adapter;
use mitemp_core::uuids::{LYWSD03MMC_DATA, MIBEACON_SERVICE};
use mitemp_core::{
    BindKey, BtleLink, BtleScanner, DeviceAddress, DeviceRegistration, GattReading, LinkOptions,
    PollerOptions, ScanOptions, SensorHub, SensorLink, SensorModel,
};
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

fn env_address(key: &str) -> Option<DeviceAddress> {
    let value = env::var(key).ok()?;
    match value.parse() {
        Ok(address) => Some(address),
        Err(e) => {
            eprintln!("Ignoring {}={}: {}", key, value, e);
            None
        }
    }
}

fn env_key() -> Option<BindKey> {
    env::var("MITEMP_KEY").ok()?.parse().ok()
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_adapter_available() {
    let adapter = get_adapter().await;
    assert!(adapter.is_ok(), "No adapter: {:?}", adapter.err());
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_receives_mibeacon_advertisements() {
    let adapter = get_adapter().await.expect("adapter");
    let scanner = Arc::new(BtleScanner::new(adapter, ScanOptions::default()));
    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let task = scanner.start(tx, cancel.clone());

    let found = timeout(BLE_TIMEOUT, async {
        while let Some(advertisement) = rx.recv().await {
            if advertisement.service_uuid == MIBEACON_SERVICE {
                return Some(advertisement);
            }
        }
        None
    })
    .await;

    cancel.cancel();
    let _ = task.await;

    match found {
        Ok(Some(advertisement)) => {
            println!(
                "{} sent {} bytes: {:02X?}",
                advertisement.address,
                advertisement.data.len(),
                advertisement.data
            );
        }
        _ => println!("No MiBeacon advertisement within {:?}", BLE_TIMEOUT),
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_decodes_encrypted_sensor() {
    let (Some(address), Some(key)) = (env_address("MITEMP_DEVICE"), env_key()) else {
        println!("MITEMP_DEVICE or MITEMP_KEY not set, skipping");
        return;
    };

    let adapter = get_adapter().await.expect("adapter");
    let scanner = Arc::new(BtleScanner::new(adapter, ScanOptions::default()));
    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let task = scanner.start(tx, cancel.clone());

    let mut hub = SensorHub::new(PollerOptions::default());
    hub.register(
        DeviceRegistration::new(address, SensorModel::Lywsd03mmc).key(key),
        OffsetDateTime::now_utc(),
    );

    let decoded = timeout(Duration::from_secs(120), async {
        while let Some(advertisement) = rx.recv().await {
            if advertisement.address != address {
                continue;
            }
            match hub.handle_advertisement(
                address,
                advertisement.service_uuid,
                &advertisement.data,
                OffsetDateTime::now_utc(),
            ) {
                Ok(changes) if changes.any() => return true,
                Ok(_) => {}
                Err(e) => println!("Dropped: {}", e),
            }
        }
        false
    })
    .await;

    cancel.cancel();
    let _ = task.await;

    if matches!(decoded, Ok(true)) {
        println!("{}", hub.status_report(OffsetDateTime::now_utc()));
    } else {
        println!("No decodable advertisement from {}", address);
    }
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_decodes_plaintext_sensor() {
    let Some(address) = env_address("MITEMP_LEGACY_DEVICE") else {
        println!("MITEMP_LEGACY_DEVICE not set, skipping");
        return;
    };

    let adapter = get_adapter().await.expect("adapter");
    let scanner = Arc::new(BtleScanner::new(adapter, ScanOptions::default()));
    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let task = scanner.start(tx, cancel.clone());

    let mut hub = SensorHub::new(PollerOptions::default());
    hub.register(
        DeviceRegistration::new(address, SensorModel::Lywsdcgq),
        OffsetDateTime::now_utc(),
    );

    let _ = timeout(Duration::from_secs(60), async {
        while let Some(advertisement) = rx.recv().await {
            if advertisement.address == address {
                let _ = hub.handle_advertisement(
                    address,
                    advertisement.service_uuid,
                    &advertisement.data,
                    OffsetDateTime::now_utc(),
                );
            }
        }
    })
    .await;

    cancel.cancel();
    let _ = task.await;
    println!("{}", hub.status_report(OffsetDateTime::now_utc()));
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_active_read() {
    let Some(address) = env_address("MITEMP_DEVICE") else {
        println!("MITEMP_DEVICE not set, skipping");
        return;
    };

    let adapter = get_adapter().await.expect("adapter");
    // Populate the adapter's peripheral list before connecting
    adapter
        .start_scan(ScanFilter::default())
        .await
        .expect("start scan");
    tokio::time::sleep(Duration::from_secs(10)).await;
    let _ = adapter.stop_scan().await;

    let (tx, mut rx) = mpsc::channel(8);
    let link = BtleLink::new(adapter, LinkOptions::default(), tx);

    link.connect(address).await.expect("connect");
    link.subscribe(LYWSD03MMC_DATA).await.expect("subscribe");

    let payload = timeout(BLE_TIMEOUT, rx.recv()).await;
    let _ = link.disconnect().await;

    let payload = payload.expect("notification timeout").expect("channel open");
    let reading = GattReading::from_bytes(&payload).expect("parse");
    println!(
        "{:.2} °C, {:.0} %, {:.3} V",
        reading.temperature, reading.humidity, reading.voltage
    );
}
