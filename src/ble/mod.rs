//! BLE communication module.
//!
//! This module provides the Bluetooth Low Energy side of supervision:
//! resolving a scale's address to a peripheral and driving its session.

pub mod connection;
pub mod scanner;

pub use connection::{ConnectionHandle, ConnectionState, PeripheralHandle};
pub use scanner::BleScanner;
