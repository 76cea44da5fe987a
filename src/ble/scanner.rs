//! Adapter selection and address resolution.

use btleplug::api::{BDAddr, Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identity::DeviceIdentity;

/// How long [`BleScanner::find_peripheral`] scans by default.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves scale addresses to btleplug peripherals on one adapter.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
}

impl BleScanner {
    /// Create a scanner on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self { adapter })
    }

    /// Create a scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Find the connectable peripheral with the given address.
    ///
    /// Peripherals the adapter already knows are returned immediately.
    /// Otherwise a scan runs for at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if nothing with that address shows
    /// up in time.
    pub async fn find_peripheral(
        &self,
        device: DeviceIdentity,
        timeout: Duration,
    ) -> Result<Peripheral> {
        let address = BDAddr::from(device);

        if let Some(peripheral) = self.known_peripheral(address).await? {
            debug!("[{}] Peripheral already known to adapter", device);
            return Ok(peripheral);
        }

        info!("[{}] Scanning for scale", device);

        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let found = tokio::time::timeout(timeout, async {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };

                match self.adapter.peripheral(&id).await {
                    Ok(peripheral) if peripheral.address() == address => {
                        return Some(peripheral);
                    }
                    Ok(_) => {}
                    Err(e) => trace!("Failed to get peripheral: {}", e),
                }
            }
            None
        })
        .await
        .ok()
        .flatten();

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        found.ok_or_else(|| Error::DeviceNotFound {
            address: device.address(),
        })
    }

    async fn known_peripheral(&self, address: BDAddr) -> Result<Option<Peripheral>> {
        let peripherals = self.adapter.peripherals().await?;
        Ok(peripherals.into_iter().find(|p| p.address() == address))
    }
}
