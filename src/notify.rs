use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, ResourceRef};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for committed schedule changes, one channel per resource.
pub struct NotifyHub {
    channels: DashMap<ResourceRef, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes on a resource. Creates the channel if needed.
    pub fn subscribe(&self, resource: ResourceRef) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(resource)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, resource: ResourceRef, event: &Event) {
        if let Some(sender) = self.channels.get(&resource) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose subscribers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let room = ResourceRef::room(4);
        let mut rx = hub.subscribe(room);

        let event = Event::ReservationCancelled { id: Ulid::new() };
        hub.send(room, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(
            ResourceRef::trainer(1),
            &Event::ReservationCancelled { id: Ulid::new() },
        );
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn channels_are_per_resource() {
        let hub = NotifyHub::new();
        let mut trainer_rx = hub.subscribe(ResourceRef::trainer(1));
        let mut room_rx = hub.subscribe(ResourceRef::room(1));

        hub.send(ResourceRef::room(1), &Event::ReservationCancelled { id: Ulid::new() });

        assert!(room_rx.recv().await.is_ok());
        assert!(matches!(
            trainer_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn prune_drops_abandoned_channels() {
        let hub = NotifyHub::new();
        let rx = hub.subscribe(ResourceRef::room(2));
        let _kept = hub.subscribe(ResourceRef::room(3));
        drop(rx);
        hub.prune();
        assert_eq!(hub.channel_count(), 1);
    }
}
