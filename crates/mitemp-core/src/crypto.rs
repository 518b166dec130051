//! Encrypted MiBeacon frame unwrapping.
//!
//! LYWSD03MMC sensors encrypt the object record of each advertisement with
//! AES-128-CCM (4-byte tag) under a per-device bind key. Two frame lengths
//! are broadcast:
//!
//! | Offset (22 / 23 bytes) | Size | Field |
//! |------------------------|------|-------|
//! | 0-1 | 2 | Frame control (bit 3 of byte 0 = encrypted) |
//! | 2-3 | 2 | Device type |
//! | 4 | 1 | Packet id |
//! | 5-10 | 6 | Advertiser MAC, reversed |
//! | 11 | 4 / 5 | Ciphertext |
//! | 15 / 16 | 3 | Payload counter |
//! | 18 / 19 | 4 | Authentication tag |
//!
//! The nonce is `MAC || device type || packet id || counter` and the
//! associated data is the single byte `0x11`.

use aes::Aes128;
use ccm::Ccm;
use ccm::aead::consts::{U4, U12};
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{AeadInPlace, KeyInit};

use mitemp_types::BindKey;

use crate::error::{DecryptFailureReason, Error, Result};

/// Nonce length for MiBeacon AES-CCM.
pub const NONCE_LEN: usize = 12;

/// Authentication tag length for MiBeacon AES-CCM.
pub const TAG_LEN: usize = 4;

/// Associated data used by every MiBeacon frame.
pub const ASSOCIATED_DATA: [u8; 1] = [0x11];

/// Frame control bit marking an encrypted payload.
pub const FRAME_CONTROL_ENCRYPTED: u8 = 0x08;

/// Supported encrypted frame lengths.
pub const ENCRYPTED_FRAME_LENGTHS: [usize; 2] = [22, 23];

const MAC_OFFSET: usize = 5;
const CIPHERTEXT_OFFSET: usize = 11;
const COUNTER_LEN: usize = 3;

type MiBeaconCcm = Ccm<Aes128, U4, U12>;

/// AEAD primitive used to open encrypted frames.
///
/// The default implementation is [`AesCcmCipher`]; tests can substitute a
/// cipher that always fails or records its inputs.
pub trait PayloadCipher: Send + Sync {
    /// Authenticate and decrypt `ciphertext`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decryption`] with
    /// [`DecryptFailureReason::AuthenticationFailed`] if the tag does not
    /// verify. No partial plaintext is ever returned.
    fn decrypt(
        &self,
        key: &BindKey,
        nonce: &[u8; NONCE_LEN],
        associated_data: &[u8],
        ciphertext: &[u8],
        tag: &[u8; TAG_LEN],
    ) -> Result<Vec<u8>>;
}

/// AES-128-CCM with a 4-byte tag and 12-byte nonce.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesCcmCipher;

impl AesCcmCipher {
    /// Encrypt `plaintext`, returning the ciphertext and detached tag.
    ///
    /// Sensors do this on their side; the gateway only needs it to build
    /// known-good frames.
    pub fn encrypt(
        &self,
        key: &BindKey,
        nonce: &[u8; NONCE_LEN],
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, [u8; TAG_LEN])> {
        let cipher = MiBeaconCcm::new(GenericArray::from_slice(key.as_bytes()));
        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(nonce), associated_data, &mut buffer)
            .map_err(|_| Error::invalid_config("AES-CCM encryption rejected the input length"))?;

        let mut tag_bytes = [0u8; TAG_LEN];
        tag_bytes.copy_from_slice(&tag);
        Ok((buffer, tag_bytes))
    }
}

impl PayloadCipher for AesCcmCipher {
    fn decrypt(
        &self,
        key: &BindKey,
        nonce: &[u8; NONCE_LEN],
        associated_data: &[u8],
        ciphertext: &[u8],
        tag: &[u8; TAG_LEN],
    ) -> Result<Vec<u8>> {
        let cipher = MiBeaconCcm::new(GenericArray::from_slice(key.as_bytes()));
        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(nonce),
                associated_data,
                &mut buffer,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| Error::decryption(DecryptFailureReason::AuthenticationFailed))?;
        Ok(buffer)
    }
}

/// The parts of an encrypted frame needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFrame<'a> {
    /// Per-packet nonce.
    pub nonce: [u8; NONCE_LEN],
    /// Encrypted object record.
    pub ciphertext: &'a [u8],
    /// Authentication tag.
    pub tag: [u8; TAG_LEN],
}

impl<'a> EncryptedFrame<'a> {
    /// Validate the frame and split it into nonce, ciphertext and tag.
    ///
    /// # Errors
    ///
    /// - [`DecryptFailureReason::UnsupportedLength`] unless the frame is 22 or
    ///   23 bytes long.
    /// - [`DecryptFailureReason::NotEncrypted`] if the frame control
    ///   encryption flag is clear. Such frames are never reinterpreted as
    ///   plaintext.
    pub fn parse(frame: &'a [u8]) -> Result<Self> {
        if !ENCRYPTED_FRAME_LENGTHS.contains(&frame.len()) {
            return Err(Error::decryption(DecryptFailureReason::UnsupportedLength(
                frame.len(),
            )));
        }

        if frame[0] & FRAME_CONTROL_ENCRYPTED == 0 {
            return Err(Error::decryption(DecryptFailureReason::NotEncrypted));
        }

        // The 23-byte variant carries one more byte of ciphertext, which
        // shifts the counter and tag by one.
        let extra = frame.len() - ENCRYPTED_FRAME_LENGTHS[0];
        let ciphertext_len = 4 + extra;
        let counter_offset = CIPHERTEXT_OFFSET + ciphertext_len;
        let tag_offset = counter_offset + COUNTER_LEN;

        let mut nonce = [0u8; NONCE_LEN];
        nonce[..6].copy_from_slice(&frame[MAC_OFFSET..MAC_OFFSET + 6]);
        nonce[6..9].copy_from_slice(&frame[2..5]);
        nonce[9..].copy_from_slice(&frame[counter_offset..counter_offset + COUNTER_LEN]);

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&frame[tag_offset..tag_offset + TAG_LEN]);

        Ok(Self {
            nonce,
            ciphertext: &frame[CIPHERTEXT_OFFSET..counter_offset],
            tag,
        })
    }
}

/// Unwrap an encrypted frame into its plaintext object record.
///
/// # Errors
///
/// Returns [`Error::Decryption`] if no key is configured, the frame fails
/// validation, or authentication fails.
pub fn unwrap_frame(
    frame: &[u8],
    key: Option<&BindKey>,
    cipher: &dyn PayloadCipher,
) -> Result<Vec<u8>> {
    let key = key.ok_or_else(|| Error::decryption(DecryptFailureReason::MissingKey))?;
    let parts = EncryptedFrame::parse(frame)?;
    cipher.decrypt(
        key,
        &parts.nonce,
        &ASSOCIATED_DATA,
        parts.ciphertext,
        &parts.tag,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::encrypted_frame;
    use mitemp_types::DeviceAddress;

    fn key() -> BindKey {
        BindKey::new([
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
            0x0f, 0x10,
        ])
    }

    fn address() -> DeviceAddress {
        DeviceAddress::new([0xA4, 0xC1, 0x38, 0x11, 0x22, 0x33])
    }

    #[test]
    fn test_round_trip_22_byte_frame() {
        let record = [0x0A, 0x10, 0x01, 0x50];
        let frame = encrypted_frame(&key(), address(), 7, &record, 0x000102).unwrap();
        assert_eq!(frame.len(), 22);

        let plaintext = unwrap_frame(&frame, Some(&key()), &AesCcmCipher).unwrap();
        assert_eq!(plaintext, record);
    }

    #[test]
    fn test_round_trip_23_byte_frame() {
        let record = [0x04, 0x10, 0x02, 0x14, 0x01];
        let frame = encrypted_frame(&key(), address(), 8, &record, 0x0A0B0C).unwrap();
        assert_eq!(frame.len(), 23);

        let plaintext = unwrap_frame(&frame, Some(&key()), &AesCcmCipher).unwrap();
        assert_eq!(plaintext, record);
    }

    #[test]
    fn test_nonce_layout() {
        let frame = encrypted_frame(&key(), address(), 0x42, &[0x0A, 0x10, 0x01, 99], 0x030201).unwrap();
        let parts = EncryptedFrame::parse(&frame).unwrap();

        assert_eq!(&parts.nonce[..6], &address().over_the_air());
        assert_eq!(&parts.nonce[6..9], &frame[2..5]);
        assert_eq!(parts.nonce[8], 0x42);
        assert_eq!(&parts.nonce[9..], &frame[15..18]);
        assert_eq!(parts.ciphertext.len(), 4);
        assert_eq!(&parts.tag, &frame[18..22]);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let frame = encrypted_frame(&key(), address(), 1, &[0x0A, 0x10, 0x01, 50], 1).unwrap();
        let other = BindKey::new([0xEE; 16]);

        let err = unwrap_frame(&frame, Some(&other), &AesCcmCipher).unwrap_err();
        assert!(matches!(
            err,
            Error::Decryption(DecryptFailureReason::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let mut frame = encrypted_frame(&key(), address(), 1, &[0x0A, 0x10, 0x01, 50], 1).unwrap();
        frame[12] ^= 0x01;

        assert!(unwrap_frame(&frame, Some(&key()), &AesCcmCipher).is_err());
    }

    #[test]
    fn test_missing_key_rejected() {
        let frame = encrypted_frame(&key(), address(), 1, &[0x0A, 0x10, 0x01, 50], 1).unwrap();
        let err = unwrap_frame(&frame, None, &AesCcmCipher).unwrap_err();
        assert!(matches!(
            err,
            Error::Decryption(DecryptFailureReason::MissingKey)
        ));
    }

    #[test]
    fn test_unsupported_lengths_rejected() {
        for len in [0usize, 12, 18, 21, 24, 30] {
            let mut frame = vec![0u8; len];
            if let Some(first) = frame.first_mut() {
                *first = 0x58;
            }
            let err = EncryptedFrame::parse(&frame).unwrap_err();
            assert!(matches!(
                err,
                Error::Decryption(DecryptFailureReason::UnsupportedLength(l)) if l == len
            ));
        }
    }

    #[test]
    fn test_clear_encryption_flag_rejected() {
        let mut frame = encrypted_frame(&key(), address(), 1, &[0x0A, 0x10, 0x01, 50], 1).unwrap();
        frame[0] &= !FRAME_CONTROL_ENCRYPTED;

        let err = unwrap_frame(&frame, Some(&key()), &AesCcmCipher).unwrap_err();
        assert!(matches!(
            err,
            Error::Decryption(DecryptFailureReason::NotEncrypted)
        ));
    }
}
