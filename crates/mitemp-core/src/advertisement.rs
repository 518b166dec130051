//! MiBeacon service data parsing for passive monitoring.
//!
//! Both sensor generations broadcast the same object record format; only the
//! framing differs:
//!
//! - **Plaintext** (LYWSDCGQ): the record starts at byte 11 of the service
//!   data, right after frame control, device type, packet id and MAC.
//! - **Encrypted** (LYWSD03MMC): the record is AES-CCM encrypted and must be
//!   unwrapped with the device bind key first (see [`crate::crypto`]).
//!
//! After framing is removed, decoding goes through the single discriminator
//! table in [`Record::decode`].

use mitemp_types::{BindKey, Dialect, ParseError, Record};

use crate::crypto::{PayloadCipher, unwrap_frame};
use crate::error::Result;

/// Offset of the object record in a plaintext frame.
pub const PLAINTEXT_RECORD_OFFSET: usize = 11;

/// Minimum plaintext frame length: header plus the discriminator byte.
pub const MIN_PLAINTEXT_FRAME_BYTES: usize = PLAINTEXT_RECORD_OFFSET + 1;

/// Decode a plaintext MiBeacon frame.
///
/// Returns `Ok(None)` if the record discriminator is not one we interpret.
///
/// # Errors
///
/// Returns [`Error::MalformedFrame`](crate::Error::MalformedFrame) if the
/// frame is shorter than [`MIN_PLAINTEXT_FRAME_BYTES`] or the record is
/// truncated.
pub fn decode_plaintext(service_data: &[u8]) -> Result<Option<Record>> {
    if service_data.len() < MIN_PLAINTEXT_FRAME_BYTES {
        return Err(ParseError::InsufficientBytes {
            expected: MIN_PLAINTEXT_FRAME_BYTES,
            actual: service_data.len(),
        }
        .into());
    }

    Ok(Record::decode(&service_data[PLAINTEXT_RECORD_OFFSET..])?)
}

/// Decode an encrypted MiBeacon frame.
///
/// # Errors
///
/// Returns [`Error::Decryption`](crate::Error::Decryption) if the frame
/// cannot be unwrapped, or
/// [`Error::MalformedFrame`](crate::Error::MalformedFrame) if the decrypted
/// record is truncated.
pub fn decode_encrypted(
    service_data: &[u8],
    key: Option<&BindKey>,
    cipher: &dyn PayloadCipher,
) -> Result<Option<Record>> {
    let record = unwrap_frame(service_data, key, cipher)?;
    Ok(Record::decode(&record)?)
}

/// Decode service data according to a device's dialect.
pub fn decode_service_data(
    dialect: Dialect,
    service_data: &[u8],
    key: Option<&BindKey>,
    cipher: &dyn PayloadCipher,
) -> Result<Option<Record>> {
    match dialect {
        Dialect::Plaintext => decode_plaintext(service_data),
        Dialect::Encrypted => decode_encrypted(service_data, key, cipher),
    }
}
