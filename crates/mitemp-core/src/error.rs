//! Error types for mitemp-core.
//!
//! Nothing in the decode engine or the scheduler is fatal: every error is
//! absorbed where it happens and shows up to collaborators only as missing
//! fresh data.
//!
//! | Error Type | Raised by | Recovery |
//! |------------|-----------|----------|
//! | [`Error::MalformedFrame`] | Frame decoder | Drop the packet |
//! | [`Error::Decryption`] | Encrypted frame unwrapper | Drop the packet |
//! | [`Error::UnknownDevice`] | Sensor hub | Ignore, not one of ours |
//! | [`Error::ConnectionFailed`] | Poll scheduler | Back to idle, retry at next deadline |
//! | [`Error::Timeout`] | Poll scheduler | Back to idle, retry at next deadline |
//! | [`Error::Bluetooth`] | btleplug backend | Logged, cycle aborted |
//! | [`Error::NoAdapter`] | btleplug backend | Fatal at startup |
//! | [`Error::InvalidConfig`] | Option validation | Fix configuration and restart |

use std::time::Duration;

use thiserror::Error;

use mitemp_types::{DeviceAddress, ParseError};

/// Errors that can occur while decoding or polling MiTemp sensors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth adapter is present.
    #[error("No Bluetooth adapter found")]
    NoAdapter,

    /// Service data could not be decoded.
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] ParseError),

    /// An encrypted frame could not be unwrapped.
    #[error("Decryption failed: {0}")]
    Decryption(DecryptFailureReason),

    /// Data arrived for an address that is not registered.
    #[error("Unknown device: {0}")]
    UnknownDevice(DeviceAddress),

    /// A registered device could not be found by address or alias.
    #[error("Device '{0}' is not registered")]
    NotRegistered(String),

    /// Connection or subscription failed.
    #[error("Connection to {address} failed: {reason}")]
    ConnectionFailed {
        /// The device that was targeted.
        address: DeviceAddress,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// No data arrived before the connection timeout.
    #[error("No data from {address} within {duration:?}")]
    Timeout {
        /// The device that was targeted.
        address: DeviceAddress,
        /// The timeout duration.
        duration: Duration,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The gateway event loop has exited.
    #[error("Gateway is not running")]
    GatewayStopped,
}

/// Structured reasons for rejecting an encrypted frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecryptFailureReason {
    /// The device has no bind key configured.
    MissingKey,
    /// Frame length is not one of the supported encrypted lengths.
    UnsupportedLength(usize),
    /// The frame control encryption flag is clear.
    NotEncrypted,
    /// The authentication tag did not verify.
    AuthenticationFailed,
}

impl std::fmt::Display for DecryptFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingKey => write!(f, "no bind key configured"),
            Self::UnsupportedLength(len) => {
                write!(f, "unsupported frame length {} (expected 22 or 23)", len)
            }
            Self::NotEncrypted => write!(f, "encryption flag not set"),
            Self::AuthenticationFailed => write!(f, "authentication tag mismatch"),
        }
    }
}

/// Structured reasons for connection failures.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// The peripheral is not known to the adapter.
    NotDiscovered,
    /// The link dropped or was refused.
    LinkFailed(String),
    /// The data characteristic was not found or could not be subscribed.
    SubscribeFailed(String),
    /// Another connection is already in progress.
    Busy,
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotDiscovered => write!(f, "device not discovered"),
            Self::LinkFailed(msg) => write!(f, "link failed: {}", msg),
            Self::SubscribeFailed(msg) => write!(f, "subscribe failed: {}", msg),
            Self::Busy => write!(f, "another connection is in progress"),
        }
    }
}

impl Error {
    /// Create a decryption failure.
    pub fn decryption(reason: DecryptFailureReason) -> Self {
        Self::Decryption(reason)
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(address: DeviceAddress, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { address, reason }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this error means a single packet was dropped.
    pub fn is_dropped_packet(&self) -> bool {
        matches!(self, Self::MalformedFrame(_) | Self::Decryption(_))
    }
}

/// Result type alias using mitemp-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
