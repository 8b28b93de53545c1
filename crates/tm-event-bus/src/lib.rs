//! Inbound event bus for the tag manager
//!
//! Host adapters and host-facing operations (`initialization()`,
//! `emit_event()`) fire events here; the dispatcher subscribes to all of
//! them and processes each one in arrival order.

use dashmap::DashMap;
use std::sync::Arc;
use tm_core::{Event, EventCategory};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The event bus for publishing and subscribing to events
///
/// Supports subscribing to one category or to every event. Firing never
/// blocks; receivers that fall behind observe `RecvError::Lagged`.
pub struct EventBus {
    /// Per-category broadcast senders
    listeners: DashMap<EventCategory, broadcast::Sender<Event>>,
    /// Sender for subscribers of every category
    match_all_sender: broadcast::Sender<Event>,
    /// Channel capacity
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with specified channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (match_all_sender, _) = broadcast::channel(capacity);
        Self {
            listeners: DashMap::new(),
            match_all_sender,
            capacity,
        }
    }

    /// Subscribe to events of one category
    pub fn subscribe(&self, category: EventCategory) -> broadcast::Receiver<Event> {
        trace!(%category, "Subscribing to event category");

        self.listeners
            .entry(category)
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .subscribe()
    }

    /// Subscribe to all events
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.match_all_sender.subscribe()
    }

    /// Fire an event to all subscribers
    ///
    /// The event is delivered to the subscribers of its category and to all
    /// match-all subscribers.
    pub fn fire(&self, event: Event) {
        debug!(category = %event.category, context_id = %event.context.id, "Firing event");

        if let Some(sender) = self.listeners.get(&event.category) {
            // Send errors only mean there is no active receiver
            let _ = sender.send(event.clone());
        }

        let _ = self.match_all_sender.send(event);
    }

    /// Get the number of categories with subscriptions
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for EventBus
pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tm_core::Element;

    #[tokio::test]
    async fn test_subscribe_and_fire() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(EventCategory::Custom);

        bus.fire(Event::custom("add_to_cart", json!({"sku": "42"})));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.category, EventCategory::Custom);
    }

    #[tokio::test]
    async fn test_match_all_subscription_preserves_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_all();

        bus.fire(Event::initialization());
        bus.fire(Event::empty(EventCategory::ViewPage));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();

        assert_eq!(first.category, EventCategory::Initialization);
        assert_eq!(second.category, EventCategory::ViewPage);
    }

    #[tokio::test]
    async fn test_no_cross_category_pollution() {
        let bus = EventBus::new();
        let mut rx_click = bus.subscribe(EventCategory::Click);
        let mut rx_error = bus.subscribe(EventCategory::JsError);

        bus.fire(Event::click(Element::new("button")));

        let received = rx_click.recv().await.unwrap();
        assert_eq!(received.category, EventCategory::Click);
        tokio_test::assert_err!(rx_error.try_recv());
        assert_eq!(bus.listener_count(), 2);
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.fire(Event::initialization());

        let mut rx = bus.subscribe_all();
        bus.fire(Event::empty(EventCategory::DomReady));

        let received = tokio_test::block_on(rx.recv());
        let received = tokio_test::assert_ok!(received);
        assert_eq!(received.category, EventCategory::DomReady);
        tokio_test::assert_err!(rx.try_recv());
    }
}
