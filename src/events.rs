//! Connection events and the bus that distributes them.
//!
//! The supervisor publishes one [`ConnectionEvent`] per connectivity
//! transition. Consumers subscribe either to everything or to a single
//! [`Topic`], i.e. one event kind for one device.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::identity::DeviceIdentity;

/// Capacity of the bus before slow subscribers start lagging.
const BUS_CAPACITY: usize = 64;

/// Kind of connectivity transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    /// The scale became reachable.
    Connected,
    /// The scale was lost.
    Disconnected,
}

impl EventKind {
    /// Prefix used in the legacy topic names.
    pub fn topic_prefix(&self) -> &'static str {
        match self {
            Self::Connected => "scale_connected",
            Self::Disconnected => "scale_disconnected",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// A single connectivity transition for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionEvent {
    /// The device the event is about.
    pub device: DeviceIdentity,
    /// What happened.
    pub kind: EventKind,
    /// When the supervisor observed it.
    pub timestamp: DateTime<Utc>,
}

impl ConnectionEvent {
    /// Create an event stamped with the current time.
    pub fn new(device: DeviceIdentity, kind: EventKind) -> Self {
        Self {
            device,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// The topic this event is delivered on.
    pub fn topic(&self) -> Topic {
        Topic::new(self.kind, self.device)
    }
}

/// Routing key: one event kind for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic {
    /// Event kind.
    pub kind: EventKind,
    /// Device address.
    pub device: DeviceIdentity,
}

impl Topic {
    /// Create a topic.
    pub fn new(kind: EventKind, device: DeviceIdentity) -> Self {
        Self { kind, device }
    }

    /// Topic for `Connected` events of `device`.
    pub fn connected(device: DeviceIdentity) -> Self {
        Self::new(EventKind::Connected, device)
    }

    /// Topic for `Disconnected` events of `device`.
    pub fn disconnected(device: DeviceIdentity) -> Self {
        Self::new(EventKind::Disconnected, device)
    }

    /// Whether `event` is routed to this topic.
    pub fn matches(&self, event: &ConnectionEvent) -> bool {
        event.kind == self.kind && event.device == self.device
    }
}

impl fmt::Display for Topic {
    /// Renders `scale_connected_<address>` / `scale_disconnected_<address>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.topic_prefix(), self.device)
    }
}

/// Sink for connection events.
///
/// Publishing is fire-and-forget: it must not block and must not fail
/// when nobody is listening. Events published in sequence by one caller
/// reach each subscriber in that sequence.
pub trait EventPublisher: Send + Sync {
    /// Deliver `event` to all current subscribers.
    fn publish(&self, event: ConnectionEvent);
}

impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    fn publish(&self, event: ConnectionEvent) {
        (**self).publish(event)
    }
}

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

impl fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandle").field("id", &self.id).finish()
    }
}

/// In-process event bus backed by a broadcast channel.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ConnectionEvent>,
    callback_counter: Arc<AtomicU64>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            tx,
            callback_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to every event on the bus.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.tx.subscribe()
    }

    /// Subscribe to a single topic.
    pub fn subscribe_topic(&self, topic: Topic) -> TopicSubscription {
        TopicSubscription {
            topic,
            rx: self.tx.subscribe(),
        }
    }

    /// Subscribe to both topics of one device.
    pub fn subscribe_device(&self, device: DeviceIdentity) -> DeviceSubscription {
        DeviceSubscription {
            device,
            rx: self.tx.subscribe(),
        }
    }

    /// Register a callback for one topic.
    ///
    /// The callback runs on a spawned task until the returned handle is
    /// dropped or unregistered.
    pub fn on_event<F>(&self, topic: Topic, callback: F) -> CallbackHandle
    where
        F: Fn(&ConnectionEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut subscription = self.subscribe_topic(topic);

        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                callback(&event);
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Number of live receivers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: ConnectionEvent) {
        trace!("Publishing {}", event.topic());
        // No receivers is not an error.
        let _ = self.tx.send(event);
    }
}

/// Receive next event accepted by `filter`, skipping over lag.
async fn recv_filtered(
    rx: &mut broadcast::Receiver<ConnectionEvent>,
    filter: impl Fn(&ConnectionEvent) -> bool,
) -> Option<ConnectionEvent> {
    loop {
        match rx.recv().await {
            Ok(event) if filter(&event) => return Some(event),
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event subscriber lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Receiver for a single [`Topic`].
pub struct TopicSubscription {
    topic: Topic,
    rx: broadcast::Receiver<ConnectionEvent>,
}

impl TopicSubscription {
    /// The topic this subscription listens to.
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Wait for the next event on the topic.
    ///
    /// Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        let topic = self.topic;
        recv_filtered(&mut self.rx, |event| topic.matches(event)).await
    }
}

/// Receiver for both topics of one device, in publication order.
pub struct DeviceSubscription {
    device: DeviceIdentity,
    rx: broadcast::Receiver<ConnectionEvent>,
}

impl DeviceSubscription {
    /// The device this subscription listens to.
    pub fn device(&self) -> DeviceIdentity {
        self.device
    }

    /// Wait for the next event for the device.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        let device = self.device;
        recv_filtered(&mut self.rx, |event| event.device == device).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn scale() -> DeviceIdentity {
        DeviceIdentity::parse("AA:BB:CC:DD:EE:FF").unwrap()
    }

    fn other() -> DeviceIdentity {
        DeviceIdentity::parse("11:22:33:44:55:66").unwrap()
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(
            Topic::connected(scale()).to_string(),
            "scale_connected_AA:BB:CC:DD:EE:FF"
        );
        assert_eq!(
            Topic::disconnected(scale()).to_string(),
            "scale_disconnected_AA:BB:CC:DD:EE:FF"
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(ConnectionEvent::new(scale(), EventKind::Connected));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_topic_subscription_filters() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_topic(Topic::disconnected(scale()));

        bus.publish(ConnectionEvent::new(scale(), EventKind::Connected));
        bus.publish(ConnectionEvent::new(other(), EventKind::Disconnected));
        bus.publish(ConnectionEvent::new(scale(), EventKind::Disconnected));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.device, scale());
        assert_eq!(event.kind, EventKind::Disconnected);
    }

    #[tokio::test]
    async fn test_device_subscription_preserves_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_device(scale());

        bus.publish(ConnectionEvent::new(scale(), EventKind::Connected));
        bus.publish(ConnectionEvent::new(other(), EventKind::Connected));
        bus.publish(ConnectionEvent::new(scale(), EventKind::Disconnected));
        bus.publish(ConnectionEvent::new(scale(), EventKind::Connected));

        let mut kinds = Vec::new();
        for _ in 0..3 {
            kinds.push(sub.recv().await.unwrap().kind);
        }
        assert_eq!(
            kinds,
            vec![
                EventKind::Connected,
                EventKind::Disconnected,
                EventKind::Connected
            ]
        );
    }

    #[tokio::test]
    async fn test_subscription_ends_when_bus_dropped() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_topic(Topic::connected(scale()));
        drop(bus);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_on_event_callback_and_unregister() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_cb = seen.clone();
        let handle = bus.on_event(Topic::connected(scale()), move |event| {
            seen_cb.lock().push(event.kind);
        });

        bus.publish(ConnectionEvent::new(scale(), EventKind::Connected));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(*seen.lock(), vec![EventKind::Connected]);

        handle.unregister();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(bus.subscriber_count(), 0);
    }
}
