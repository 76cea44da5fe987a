//! # bs440-rust-ble
//!
//! Keeps a Bluetooth Low Energy connection to a Medisana BS440
//! body-composition scale alive and tells interested parties whenever the
//! scale comes and goes.
//!
//! A scale spends most of its life out of range or asleep, so the
//! supervisor never gives up: it retries every scan interval, checks the
//! session at the same cadence once connected, and publishes exactly one
//! event per connectivity transition.
//!
//! ## Features
//!
//! - **Supervision**: one task per scale, perpetual reconnect with fixed backoff
//! - **Event Bus**: typed `Connected`/`Disconnected` events keyed by device
//! - **Availability**: a ready-made consumer mirroring connectivity into a flag
//! - **Lifecycle**: set up, reload and unload scales by address
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bs440_rust_ble::{Result, ScaleAvailability, ScaleConfig, ScaleManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = ScaleManager::new().await?;
//!     let config = ScaleConfig::new("AA:BB:CC:DD:EE:FF")?;
//!     let availability = ScaleAvailability::new(manager.event_bus(), config.device);
//!
//!     manager.setup(config).await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     println!("available: {}", availability.is_available());
//!
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### macOS
//! CoreBluetooth hides hardware addresses, so peripherals cannot be
//! resolved by address there.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for configuration and event types

// Public modules
pub mod availability;
pub mod ble;
pub mod config;
pub mod device_manager;
pub mod error;
pub mod events;
pub mod identity;
pub mod registry;
pub mod supervisor;
pub mod utils;

// Re-exports for convenience
pub use availability::ScaleAvailability;
pub use ble::connection::{ConnectionHandle, ConnectionState, PeripheralHandle};
pub use config::{ScaleConfig, SupervisionConfig};
pub use device_manager::ScaleManager;
pub use error::{Error, Result};
pub use events::{
    CallbackHandle, ConnectionEvent, EventBus, EventKind, EventPublisher, Topic,
};
pub use identity::DeviceIdentity;
pub use registry::SupervisorRegistry;
pub use supervisor::{Supervisor, SupervisorTask};
pub use utils::{kilograms_to_pounds, pounds_to_kilograms, MassUnit};
