//! Lifecycle management for supervised scales.
//!
//! [`ScaleManager`] turns a [`ScaleConfig`] into a running supervisor:
//! it resolves the scale's address on the Bluetooth adapter, wraps the
//! peripheral in a [`PeripheralHandle`] and spawns a [`Supervisor`] that
//! publishes onto the manager's [`EventBus`].

use btleplug::platform::Adapter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::ble::connection::PeripheralHandle;
use crate::ble::scanner::{BleScanner, DEFAULT_DISCOVERY_TIMEOUT};
use crate::config::ScaleConfig;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::identity::DeviceIdentity;
use crate::registry::SupervisorRegistry;
use crate::supervisor::{Supervisor, SupervisorTask};

/// Owns the supervisors of all configured scales.
pub struct ScaleManager {
    /// BLE scanner used to resolve addresses.
    scanner: BleScanner,
    /// Bus every supervisor publishes to.
    bus: EventBus,
    /// Running supervisors.
    registry: SupervisorRegistry,
    /// Adapter event watchers, one per supervised scale.
    watchers: Mutex<HashMap<DeviceIdentity, JoinHandle<()>>>,
    /// How long setup scans for a scale that is not yet known.
    discovery_timeout: Duration,
}

impl ScaleManager {
    /// Create a manager on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Ok(Self::from_scanner(BleScanner::new().await?))
    }

    /// Create a manager on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self::from_scanner(BleScanner::with_adapter(adapter))
    }

    fn from_scanner(scanner: BleScanner) -> Self {
        Self {
            scanner,
            bus: EventBus::new(),
            registry: SupervisorRegistry::new(),
            watchers: Mutex::new(HashMap::new()),
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }

    /// Change how long setup scans for an unknown scale.
    pub fn set_discovery_timeout(&mut self, timeout: Duration) {
        self.discovery_timeout = timeout;
    }

    /// The bus connection events are published on.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Start supervising the scale described by `config`.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceNotFound`] if the adapter cannot see the scale. The
    ///   caller may retry setup later.
    /// - [`Error::AlreadySupervised`] if a supervisor for the scale is still
    ///   running. A supervisor that has ended is replaced.
    pub async fn setup(&self, config: ScaleConfig) -> Result<()> {
        let device = config.device;

        if self.registry.is_running(device) {
            return Err(Error::AlreadySupervised {
                address: device.address(),
            });
        }

        let peripheral = self
            .scanner
            .find_peripheral(device, self.discovery_timeout)
            .await
            .map_err(|e| {
                warn!("[{}] Setup failed: {}", device, e);
                e
            })?;

        let handle = PeripheralHandle::new(device, peripheral);
        let watcher = handle.watch_adapter_events(self.scanner.adapter());
        let supervisor = Supervisor::new(device, config.supervision, handle, self.bus.clone());

        if let Err(e) = self
            .registry
            .start(device, || SupervisorTask::spawn(supervisor))
        {
            watcher.abort();
            return Err(e);
        }

        if let Some(stale) = self.watchers.lock().insert(device, watcher) {
            stale.abort();
        }

        info!(
            "[{}] Scale set up, scan interval {}s",
            device,
            config.supervision.scan_interval_secs()
        );
        Ok(())
    }

    /// Stop supervising `device` and release its connection.
    ///
    /// Returns `false` if the device was not set up.
    pub async fn unload(&self, device: DeviceIdentity) -> Result<bool> {
        if let Some(watcher) = self.watchers.lock().remove(&device) {
            watcher.abort();
        }

        let unloaded = self.registry.stop(device).await?;
        if unloaded {
            info!("[{}] Scale unloaded", device);
        }
        Ok(unloaded)
    }

    /// Apply a changed configuration by unloading and setting up again.
    pub async fn reload(&self, config: ScaleConfig) -> Result<()> {
        self.unload(config.device).await?;
        self.setup(config).await
    }

    /// Whether `device` currently has a running supervisor.
    pub fn is_supervised(&self, device: DeviceIdentity) -> bool {
        self.registry.is_running(device)
    }

    /// All supervised devices.
    pub fn devices(&self) -> Vec<DeviceIdentity> {
        self.registry.devices()
    }

    /// Clean shutdown of all supervisors and connections.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down scale manager");

        for (_, watcher) in self.watchers.lock().drain() {
            watcher.abort();
        }

        self.registry.shutdown().await
    }
}

impl Drop for ScaleManager {
    fn drop(&mut self) {
        for (_, watcher) in self.watchers.lock().drain() {
            watcher.abort();
        }
    }
}
