//! In-process publish/subscribe bus for object lifecycle events.
//!
//! Publication happens on the `broadcast` channel's bounded ring buffer;
//! a subscriber that falls behind loses the oldest events rather than
//! stalling the publisher, matching the "never back-pressure the
//! publisher" requirement.

use tokio::sync::broadcast;

use crate::models::event::S3Event;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<S3Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Register a new subscriber. Dropping the returned receiver detaches it.
    pub fn subscribe(&self) -> broadcast::Receiver<S3Event> {
        self.sender.subscribe()
    }

    /// Deliver an event to all current subscribers. A lack of subscribers
    /// is not an error; publication is fire-and-forget.
    pub fn publish(&self, event: S3Event) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::EventName;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(S3Event::new(EventName::ObjectCreatedPut, "b", "k"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_name, "ObjectCreated:Put");
        assert_eq!(event.bucket_name, "b");
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_error() {
        let bus = EventBus::new();
        bus.publish(S3Event::new(EventName::ObjectRemovedDelete, "b", "k"));
    }
}
