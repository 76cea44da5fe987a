//! Error types for the bs440-rust-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The scale could not be found by the adapter during setup.
    #[error("[{address}] Device could not be found")]
    DeviceNotFound {
        /// The canonical address that was searched for.
        address: String,
    },

    /// The given string is not a usable hardware address.
    #[error("Invalid device address: {value:?}")]
    InvalidAddress {
        /// The rejected input.
        value: String,
    },

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// A connect or keepalive attempt failed.
    ///
    /// Unreachable peripherals, rejected sessions and transport errors all
    /// land here; the supervisor does not distinguish between them.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// A connect attempt did not finish within the configured timeout.
    #[error("Connection attempt timed out")]
    Timeout,

    /// Operation requires a connection but the scale is not connected.
    #[error("Scale not connected")]
    NotConnected,

    /// A supervisor is already running for this device.
    #[error("[{address}] Device is already supervised")]
    AlreadySupervised {
        /// The canonical address of the device.
        address: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error belongs to the connection-failure class: the scale
    /// was unreachable, timed out or rejected the session.
    ///
    /// The supervisor retries every handle error regardless of class and
    /// uses this only to pick the log level of a failed attempt.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Bluetooth(_) | Self::ConnectionFailed { .. } | Self::Timeout | Self::NotConnected
        )
    }

    /// Whether this is a setup-time condition the caller may retry later.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::DeviceNotFound { .. } | Self::BluetoothUnavailable)
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
