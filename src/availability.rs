//! Availability mirror for a single scale.
//!
//! [`ScaleAvailability`] is the consumer side of the event bus: it listens
//! to one device's connection events and keeps an availability flag that a
//! UI or entity layer can read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::events::{EventBus, EventKind};
use crate::identity::DeviceIdentity;
use crate::utils::MassUnit;

/// Mirrors a scale's connectivity into an availability flag.
///
/// Starts unavailable. The listener stops when this value is dropped.
pub struct ScaleAvailability {
    device: DeviceIdentity,
    name: String,
    available: Arc<AtomicBool>,
    listener: JoinHandle<()>,
}

impl ScaleAvailability {
    /// Start mirroring `device`'s events from `bus`.
    pub fn new(bus: &EventBus, device: DeviceIdentity) -> Self {
        Self::with_callback(bus, device, |_| {})
    }

    /// Like [`ScaleAvailability::new`], calling `on_change` after every
    /// event with the new availability.
    pub fn with_callback<F>(bus: &EventBus, device: DeviceIdentity, on_change: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let available = Arc::new(AtomicBool::new(false));
        let mut subscription = bus.subscribe_device(device);

        let flag = available.clone();
        let listener = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let is_available = event.kind == EventKind::Connected;
                debug!("[{}] Availability -> {}", device, is_available);
                flag.store(is_available, Ordering::SeqCst);
                on_change(is_available);
            }
        });

        Self {
            device,
            name: device.slug(),
            available,
            listener,
        }
    }

    /// Whether the scale is currently reachable.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// The mirrored device.
    pub fn device(&self) -> DeviceIdentity {
        self.device
    }

    /// Stable unique id (lowercase address).
    pub fn unique_id(&self) -> String {
        self.device.unique_id()
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Override the display name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Unit weights are reported in by the scale.
    pub fn native_unit(&self) -> MassUnit {
        MassUnit::Kilograms
    }
}

impl Drop for ScaleAvailability {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl std::fmt::Debug for ScaleAvailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScaleAvailability")
            .field("device", &self.device)
            .field("name", &self.name)
            .field("available", &self.is_available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ConnectionEvent, EventPublisher};
    use parking_lot::Mutex;

    fn scale() -> DeviceIdentity {
        DeviceIdentity::parse("AA:BB:CC:DD:EE:FF").unwrap()
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_starts_unavailable() {
        let bus = EventBus::new();
        let availability = ScaleAvailability::new(&bus, scale());
        assert!(!availability.is_available());
        assert_eq!(availability.name(), "aa_bb_cc_dd_ee_ff");
        assert_eq!(availability.unique_id(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(availability.native_unit(), MassUnit::Kilograms);
    }

    #[tokio::test]
    async fn test_follows_events_for_its_device_only() {
        let bus = EventBus::new();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let changes_cb = changes.clone();
        let availability = ScaleAvailability::with_callback(&bus, scale(), move |available| {
            changes_cb.lock().push(available);
        });

        bus.publish(ConnectionEvent::new(scale(), EventKind::Connected));
        settle().await;
        assert!(availability.is_available());

        let other = DeviceIdentity::parse("11:22:33:44:55:66").unwrap();
        bus.publish(ConnectionEvent::new(other, EventKind::Disconnected));
        settle().await;
        assert!(availability.is_available());

        bus.publish(ConnectionEvent::new(scale(), EventKind::Disconnected));
        settle().await;
        assert!(!availability.is_available());

        assert_eq!(*changes.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        let availability = ScaleAvailability::new(&bus, scale());
        assert_eq!(bus.subscriber_count(), 1);

        drop(availability);
        settle().await;
        assert_eq!(bus.subscriber_count(), 0);
    }
}
