//! Observer registry for broadcasting consumer events.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{ConsumerEvent, DropReason, ObserverConfig, ObserverHandle, ObserverId};

/// Internal observer state.
struct Observer {
    config: ObserverConfig,
    sender: Sender<ConsumerEvent>,
}

impl Observer {
    /// Try to send an event. Returns false if the buffer is full or the
    /// receiver is gone (observer will be dropped).
    fn try_send(&self, event: ConsumerEvent) -> bool {
        self.sender.try_send(event).is_ok()
    }
}

/// Manages observers and broadcasts events to them.
pub struct ObserverRegistry {
    observers: RwLock<HashMap<ObserverId, Observer>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new observer.
    pub fn subscribe(&self, config: ObserverConfig) -> ObserverHandle {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.observers
            .write()
            .insert(id, Observer { config, sender });

        ObserverHandle { id, receiver }
    }

    /// Unregister and notify the observer (best effort).
    pub fn unsubscribe(&self, id: ObserverId) {
        if let Some(observer) = self.observers.write().remove(&id) {
            let _ = observer.sender.try_send(ConsumerEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Send an event to every observer whose filter accepts it.
    /// Drops observers that fail to receive.
    pub fn broadcast(&self, event: ConsumerEvent) {
        let mut to_remove = Vec::new();

        {
            let observers = self.observers.read();
            for (id, observer) in observers.iter() {
                if observer.config.filter.matches(&event) && !observer.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut observers = self.observers.write();
            for id in to_remove {
                if let Some(observer) = observers.remove(&id) {
                    tracing::debug!(observer = id.0, "dropping slow observer");
                    // Usually fails too: the buffer is what overflowed.
                    let _ = observer.sender.try_send(ConsumerEvent::Dropped {
                        reason: DropReason::BufferOverflow,
                    });
                }
            }
        }
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observers::ObserverFilter;
    use crate::types::{Message, Offset, TransportKind};
    use std::time::Duration;

    #[test]
    fn test_subscribe_unsubscribe() {
        let registry = ObserverRegistry::new();

        let handle = registry.subscribe(ObserverConfig::default());
        assert_eq!(registry.observer_count(), 1);

        registry.unsubscribe(handle.id);
        assert_eq!(registry.observer_count(), 0);

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert!(matches!(
            event,
            ConsumerEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        ));
    }

    #[test]
    fn test_broadcast_filters() {
        let registry = ObserverRegistry::new();
        let messages = registry.subscribe(ObserverConfig {
            filter: ObserverFilter::messages(),
            ..Default::default()
        });
        let connection = registry.subscribe(ObserverConfig {
            filter: ObserverFilter::connection(),
            ..Default::default()
        });

        registry.broadcast(ConsumerEvent::MessageReceived {
            message: Message::text("m1", 1, "alice", "bob", "hi"),
        });
        registry.broadcast(ConsumerEvent::Connected {
            transport: TransportKind::Push,
            offset: Offset(1),
        });

        let got = messages.drain();
        assert_eq!(got.len(), 1);
        assert!(matches!(got[0], ConsumerEvent::MessageReceived { .. }));

        let got = connection.drain();
        assert_eq!(got.len(), 1);
        assert!(matches!(got[0], ConsumerEvent::Connected { .. }));
    }

    #[test]
    fn test_drop_slow_observer() {
        let registry = ObserverRegistry::new();
        let _handle = registry.subscribe(ObserverConfig {
            buffer_size: 2,
            filter: ObserverFilter::all(),
        });

        for i in 0..10 {
            registry.broadcast(ConsumerEvent::MessagesChanged {
                count: i,
                current_offset: Offset(i as u64),
            });
        }

        assert_eq!(registry.observer_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_is_removed() {
        let registry = ObserverRegistry::new();
        let handle = registry.subscribe(ObserverConfig::default());
        drop(handle);

        registry.broadcast(ConsumerEvent::Disconnected);
        assert_eq!(registry.observer_count(), 0);
    }
}
