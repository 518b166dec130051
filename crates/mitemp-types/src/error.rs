//! Error types for data parsing in mitemp-types.

use thiserror::Error;

/// Errors that can occur when parsing MiTemp sensor data.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in mitemp-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Not enough bytes to decode the structure.
    #[error("Insufficient data: requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Number of bytes required.
        expected: usize,
        /// Number of bytes available.
        actual: usize,
    },

    /// A Bluetooth address string could not be parsed.
    #[error("Invalid device address '{0}': expected AA:BB:CC:DD:EE:FF")]
    InvalidAddress(String),

    /// A bind key string could not be parsed.
    #[error("Invalid bind key: {0}")]
    InvalidKey(String),

    /// A sensor model name was not recognised.
    #[error("Unknown sensor model '{0}'")]
    UnknownModel(String),
}

/// Result type alias using mitemp-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
