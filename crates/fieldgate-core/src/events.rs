//! Event bus for device status and value fan-out.
//!
//! A single broadcast channel carries both event kinds to any number of
//! subscribers (UI layers, the history forwarder, tests). Delivery order is
//! FIFO per device because each device's adapter publishes from one task;
//! no ordering is guaranteed across devices.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::BusError;
use crate::types::{DeviceId, DeviceStatus, TagId, TagSample};

// =============================================================================
// DeviceEvent
// =============================================================================

/// An event emitted by a device adapter.
///
/// Events are emitted at most once per logical transition: a status event
/// only when the status actually changes, a value event once per completed
/// poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// The device's lifecycle status changed.
    StatusChanged {
        /// The device.
        device_id: DeviceId,
        /// The new status.
        status: DeviceStatus,
    },

    /// A poll cycle completed and produced samples.
    ValuesChanged {
        /// The device.
        device_id: DeviceId,
        /// All samples of the cycle, keyed by tag ID.
        values: HashMap<TagId, TagSample>,
    },
}

impl DeviceEvent {
    /// Returns the device this event concerns.
    pub fn device_id(&self) -> &DeviceId {
        match self {
            DeviceEvent::StatusChanged { device_id, .. } => device_id,
            DeviceEvent::ValuesChanged { device_id, .. } => device_id,
        }
    }
}

// =============================================================================
// EventBus
// =============================================================================

/// Broadcast bus distributing [`DeviceEvent`]s to all subscribers.
///
/// Built on `tokio::sync::broadcast`: slow subscribers lag and drop the
/// oldest events rather than back-pressuring the publishing adapters.
pub struct EventBus {
    sender: broadcast::Sender<DeviceEvent>,
    published: AtomicU64,
}

impl EventBus {
    /// Creates a bus with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity);
        Arc::new(Self {
            sender,
            published: AtomicU64::new(0),
        })
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Publishing with no subscribers is not an error; the event is simply
    /// dropped.
    pub fn publish(&self, event: DeviceEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(event);
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns the total number of events published.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.published())
            .finish()
    }
}

// =============================================================================
// EventSubscriber
// =============================================================================

/// A subscription to the event bus.
pub struct EventSubscriber {
    receiver: broadcast::Receiver<DeviceEvent>,
}

impl EventSubscriber {
    /// Receives the next event.
    ///
    /// # Errors
    ///
    /// [`BusError::Lagged`] if this subscriber fell behind and events were
    /// dropped; [`BusError::Closed`] if the bus is gone.
    pub async fn recv(&mut self) -> Result<DeviceEvent, BusError> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => Err(BusError::Lagged { missed }),
            Err(broadcast::error::RecvError::Closed) => Err(BusError::Closed),
        }
    }

    /// Receives the next event, skipping over lag gaps.
    pub async fn recv_skip_lag(&mut self) -> Result<DeviceEvent, BusError> {
        loop {
            match self.recv().await {
                Err(BusError::Lagged { missed }) => {
                    tracing::warn!(missed, "Event subscriber lagged, skipping");
                }
                other => return other,
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe();

        bus.publish(DeviceEvent::StatusChanged {
            device_id: DeviceId::new("d1"),
            status: DeviceStatus::Connected,
        });

        let event = sub.recv().await.unwrap();
        assert_eq!(event.device_id().as_str(), "d1");
        assert!(matches!(
            event,
            DeviceEvent::StatusChanged {
                status: DeviceStatus::Connected,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(DeviceEvent::ValuesChanged {
            device_id: DeviceId::new("d1"),
            values: HashMap::new(),
        });

        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new(16);
        // Must not error or panic.
        bus.publish(DeviceEvent::StatusChanged {
            device_id: DeviceId::new("d1"),
            status: DeviceStatus::Idle,
        });
        assert_eq!(bus.published(), 1);
    }

    #[tokio::test]
    async fn test_lag_detection() {
        let bus = EventBus::new(1);
        let mut sub = bus.subscribe();

        for i in 0..3 {
            bus.publish(DeviceEvent::StatusChanged {
                device_id: DeviceId::new(format!("d{}", i)),
                status: DeviceStatus::Idle,
            });
        }

        assert!(matches!(sub.recv().await, Err(BusError::Lagged { .. })));
        // After the lag error the newest retained event is delivered.
        assert!(sub.recv_skip_lag().await.is_ok());
    }
}
