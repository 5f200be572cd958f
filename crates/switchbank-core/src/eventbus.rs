//! Event bus for the data tree.
//!
//! Every component talks to the tree by publishing and subscribing to
//! [`TreeEvent`]s. Publishing never blocks, so put handlers can emit from
//! synchronous code.

use tokio::sync::broadcast;
use tracing::warn;

use crate::event::{EventMetadata, TreeEvent};

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Broadcast event bus.
///
/// - Publishing events with automatic metadata generation
/// - Subscribing to all events
/// - Filtered subscriptions for specific event kinds
#[derive(Clone)]
pub struct EventBus {
    /// Broadcast channel sender
    tx: broadcast::Sender<(TreeEvent, EventMetadata)>,
    /// Event bus name for identification
    name: String,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the specified capacity.
    ///
    /// The capacity determines how many events are buffered for slow subscribers.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            name: "default".to_string(),
        }
    }

    /// Create a new event bus with a name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            tx: broadcast::channel(DEFAULT_CHANNEL_CAPACITY).0,
            name: name.into(),
        }
    }

    /// Get the name of this event bus.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event with default metadata.
    ///
    /// If there are no subscribers the event is discarded. Returns `true`
    /// if there was at least one subscriber.
    pub fn publish(&self, event: TreeEvent) -> bool {
        self.publish_with_source(event, "system")
    }

    /// Publish an event with a custom source.
    pub fn publish_with_source(&self, event: TreeEvent, source: impl Into<String>) -> bool {
        self.publish_with_metadata(event, EventMetadata::new(source))
    }

    /// Publish an event with custom metadata.
    pub fn publish_with_metadata(&self, event: TreeEvent, metadata: EventMetadata) -> bool {
        self.tx.send((event, metadata)).is_ok()
    }

    /// Subscribe to all events.
    ///
    /// If the subscriber falls behind, older events are dropped.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Subscribe to events matching a filter.
    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredReceiver<F>
    where
        F: Fn(&TreeEvent) -> bool + Send + 'static,
    {
        FilteredReceiver::new(self.tx.subscribe(), filter)
    }

    /// Create a filtered subscription helper for common patterns.
    pub fn filter(&self) -> FilterBuilder {
        FilterBuilder {
            tx: self.tx.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for all events from the event bus.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<(TreeEvent, EventMetadata)>,
}

impl EventBusReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` once the event bus is closed.
    pub async fn recv(&mut self) -> Option<(TreeEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event bus receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<(TreeEvent, EventMetadata)> {
        self.rx.try_recv().ok()
    }

    /// Get the underlying broadcast receiver.
    pub fn into_inner(self) -> broadcast::Receiver<(TreeEvent, EventMetadata)> {
        self.rx
    }
}

/// Receiver for filtered events from the event bus.
pub struct FilteredReceiver<F>
where
    F: Fn(&TreeEvent) -> bool + Send,
{
    rx: broadcast::Receiver<(TreeEvent, EventMetadata)>,
    filter: F,
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&TreeEvent) -> bool + Send,
{
    fn new(rx: broadcast::Receiver<(TreeEvent, EventMetadata)>, filter: F) -> Self {
        Self { rx, filter }
    }

    /// Receive the next event matching the filter.
    ///
    /// Returns `None` once the event bus is closed.
    pub async fn recv(&mut self) -> Option<(TreeEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok((event, meta)) => {
                    if (self.filter)(&event) {
                        return Some((event, meta));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "filtered receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a matching event without blocking.
    pub fn try_recv(&mut self) -> Option<(TreeEvent, EventMetadata)> {
        while let Ok((event, meta)) = self.rx.try_recv() {
            if (self.filter)(&event) {
                return Some((event, meta));
            }
        }
        None
    }
}

/// Builder for creating filtered subscriptions.
pub struct FilterBuilder {
    tx: broadcast::Sender<(TreeEvent, EventMetadata)>,
}

impl FilterBuilder {
    /// Subscribe to value deltas only.
    pub fn delta_events(&self) -> FilteredReceiver<fn(&TreeEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), TreeEvent::is_delta)
    }

    /// Subscribe to metadata commits only.
    pub fn meta_events(&self) -> FilteredReceiver<fn(&TreeEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), TreeEvent::is_meta)
    }

    /// Subscribe to outbound field-bus messages only.
    pub fn outbound_events(&self) -> FilteredReceiver<fn(&TreeEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), TreeEvent::is_outbound)
    }

    /// Subscribe to status diagnostics only.
    pub fn status_events(&self) -> FilteredReceiver<fn(&TreeEvent) -> bool> {
        FilteredReceiver::new(self.tx.subscribe(), TreeEvent::is_status)
    }

    /// Subscribe to outbound messages on one transmit channel.
    pub fn outbound_channel(
        &self,
        channel: impl Into<String>,
    ) -> FilteredReceiver<impl Fn(&TreeEvent) -> bool + Send + 'static> {
        let target = channel.into();
        FilteredReceiver::new(
            self.tx.subscribe(),
            move |event| matches!(event, TreeEvent::Outbound { channel, .. } if channel == &target),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        assert!(bus.publish(TreeEvent::delta("a.1.1.state", json!(1), "test")));

        let (event, meta) = rx.recv().await.unwrap();
        assert_eq!(event.type_name(), "Delta");
        assert_eq!(meta.source, "system");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::with_name("lonely");
        assert_eq!(bus.name(), "lonely");
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.publish(TreeEvent::outbound("nmea2000out", "x")));
    }

    #[tokio::test]
    async fn test_filtered_outbound_channel() {
        let bus = EventBus::new();
        let mut rx = bus.filter().outbound_channel("nmea2000out");

        bus.publish(TreeEvent::outbound("other", "ignored"));
        bus.publish(TreeEvent::delta("a.1.1.state", json!(0), "test"));
        bus.publish_with_source(TreeEvent::outbound("nmea2000out", "wanted"), "plugin");

        let (event, meta) = rx.recv().await.unwrap();
        match event {
            TreeEvent::Outbound { payload, .. } => assert_eq!(payload, "wanted"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(meta.source, "plugin");
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_delta_filter_skips_other_events() {
        let bus = EventBus::new();
        let mut rx = bus.filter().delta_events();

        bus.publish(TreeEvent::outbound("nmea2000out", "x"));
        bus.publish(TreeEvent::delta("a.1.2.state", json!(1), "test"));

        let (event, _) = rx.recv().await.unwrap();
        assert_eq!(event.path(), Some("a.1.2.state"));
    }
}
