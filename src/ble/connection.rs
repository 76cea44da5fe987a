//! BLE connection handles.
//!
//! [`ConnectionHandle`] is the capability the supervisor drives.
//! [`PeripheralHandle`] implements it on top of a btleplug peripheral.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identity::DeviceIdentity;

/// Connection state of a supervised scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected to the scale.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected to the scale.
    Connected,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// A session with one peripheral.
///
/// Implementations own the transport. `connect` fails with a
/// connection-class [`Error`] when the peripheral is unreachable or
/// rejects the session. `is_connected` reports the last known transport
/// state and never blocks.
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    /// Establish the session. Succeeds immediately if already established.
    async fn connect(&self) -> Result<()>;

    /// Tear the session down.
    async fn disconnect(&self) -> Result<()>;

    /// Last known transport state.
    fn is_connected(&self) -> bool;

    /// Assert the session is still alive.
    async fn keepalive(&self) -> Result<()> {
        self.connect().await
    }
}

#[async_trait]
impl<T: ConnectionHandle + ?Sized> ConnectionHandle for Arc<T> {
    async fn connect(&self) -> Result<()> {
        (**self).connect().await
    }

    async fn disconnect(&self) -> Result<()> {
        (**self).disconnect().await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn keepalive(&self) -> Result<()> {
        (**self).keepalive().await
    }
}

/// [`ConnectionHandle`] backed by a btleplug peripheral.
pub struct PeripheralHandle {
    /// Address of the peripheral.
    device: DeviceIdentity,
    /// The peripheral to manage.
    peripheral: Peripheral,
    /// Cached transport state.
    connected: Arc<AtomicBool>,
}

impl PeripheralHandle {
    /// Wrap a peripheral.
    pub fn new(device: DeviceIdentity, peripheral: Peripheral) -> Self {
        Self {
            device,
            peripheral,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Address of the peripheral.
    pub fn device(&self) -> DeviceIdentity {
        self.device
    }

    /// Keep the cached transport state in sync with adapter events.
    ///
    /// The returned task runs until the adapter's event stream ends or
    /// the handle is aborted.
    pub fn watch_adapter_events(&self, adapter: &Adapter) -> tokio::task::JoinHandle<()> {
        let adapter = adapter.clone();
        let id = self.peripheral.id();
        let connected = self.connected.clone();
        let device = self.device;

        tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("[{}] Failed to get adapter events: {}", device, e);
                    return;
                }
            };

            while let Some(event) = events.next().await {
                match event {
                    CentralEvent::DeviceConnected(event_id) if event_id == id => {
                        debug!("[{}] Transport connected", device);
                        connected.store(true, Ordering::SeqCst);
                    }
                    CentralEvent::DeviceDisconnected(event_id) if event_id == id => {
                        debug!("[{}] Transport disconnected", device);
                        connected.store(false, Ordering::SeqCst);
                    }
                    _ => {}
                }
            }

            trace!("[{}] Adapter event stream ended", device);
        })
    }

    /// Re-read the transport state from the platform.
    async fn refresh(&self) -> bool {
        let is_connected = self.peripheral.is_connected().await.unwrap_or(false);
        self.connected.store(is_connected, Ordering::SeqCst);
        is_connected
    }
}

#[async_trait]
impl ConnectionHandle for PeripheralHandle {
    async fn connect(&self) -> Result<()> {
        if self.refresh().await {
            trace!("[{}] Already connected at BLE level", self.device);
            return Ok(());
        }

        match self.peripheral.connect().await {
            Ok(()) => {
                info!("[{}] Connected to scale", self.device);

                if let Err(e) = self.peripheral.discover_services().await {
                    warn!("[{}] Failed to discover services: {}", self.device, e);
                }

                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.refresh().await;
                Err(Error::ConnectionFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.refresh().await {
            return Ok(());
        }

        let result = self.peripheral.disconnect().await;
        self.connected.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                info!("[{}] Disconnected from scale", self.device);
                Ok(())
            }
            Err(e) => {
                error!("[{}] Failed to disconnect: {}", self.device, e);
                Err(Error::Bluetooth(e))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());

        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(!ConnectionState::Connected.is_transitioning());
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Connected), "Connected");
        assert_eq!(format!("{}", ConnectionState::Connecting), "Connecting");
        assert_eq!(format!("{}", ConnectionState::Disconnected), "Disconnected");
    }

    struct AlwaysUp;

    #[async_trait]
    impl ConnectionHandle for AlwaysUp {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_keepalive_defaults_to_connect_through_arc() {
        let handle: Arc<dyn ConnectionHandle> = Arc::new(AlwaysUp);
        assert!(handle.keepalive().await.is_ok());
        assert!(handle.is_connected());
    }
}
