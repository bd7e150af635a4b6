//! Observer types for consumer state changes.

use crate::error::ConsumerError;
use crate::types::{Message, MessageId, Offset, TransportKind};

/// Configuration for an observer.
#[derive(Clone, Debug)]
pub struct ObserverConfig {
    /// Max buffered events before dropping the observer.
    /// Default: 256
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: ObserverFilter,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            filter: ObserverFilter::all(),
        }
    }
}

/// Which event families an observer receives.
#[derive(Clone, Debug, Default)]
pub struct ObserverFilter {
    /// Message arrivals, removals and buffer changes.
    pub include_messages: bool,

    /// Connect / disconnect transitions.
    pub include_connection: bool,

    /// Errors that land in the consumer's error slot.
    pub include_errors: bool,

    /// Loading flag transitions.
    pub include_loading: bool,
}

impl ObserverFilter {
    /// Observe message traffic only.
    pub fn messages() -> Self {
        Self {
            include_messages: true,
            ..Default::default()
        }
    }

    /// Observe connection state and errors.
    pub fn connection() -> Self {
        Self {
            include_connection: true,
            include_errors: true,
            ..Default::default()
        }
    }

    /// Observe everything.
    pub fn all() -> Self {
        Self {
            include_messages: true,
            include_connection: true,
            include_errors: true,
            include_loading: true,
        }
    }

    pub(crate) fn matches(&self, event: &ConsumerEvent) -> bool {
        match event {
            ConsumerEvent::MessageReceived { .. }
            | ConsumerEvent::MessageRemoved { .. }
            | ConsumerEvent::MessagesChanged { .. } => self.include_messages,
            ConsumerEvent::Connected { .. } | ConsumerEvent::Disconnected => {
                self.include_connection
            }
            ConsumerEvent::Error { .. } => self.include_errors,
            ConsumerEvent::Loading { .. } => self.include_loading,
            ConsumerEvent::Dropped { .. } => true,
        }
    }
}

/// Events republished by the consumer.
#[derive(Clone, Debug)]
pub enum ConsumerEvent {
    // --- Message Events ---
    /// A live session delivered a message that was new to the buffer.
    MessageReceived { message: Message },

    /// A message was removed after a confirmed delete.
    MessageRemoved { id: MessageId },

    /// The buffer changed in bulk (history load, range merge, poll batch).
    MessagesChanged { count: usize, current_offset: Offset },

    // --- Connection Events ---
    /// A session became active.
    Connected {
        transport: TransportKind,
        offset: Offset,
    },

    /// The session ended, by request or because the remote closed it.
    Disconnected,

    /// An initialization or transport error landed in the error slot.
    Error { error: ConsumerError },

    /// A history or range load started or finished.
    Loading { active: bool },

    // --- Lifecycle Events ---
    /// Observer was dropped.
    Dropped { reason: DropReason },
}

/// Why an observer was dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Event buffer overflowed (slow observer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

/// Handle to receive events for one observer.
pub struct ObserverHandle {
    pub id: ObserverId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<ConsumerEvent>,
}

impl ObserverHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ConsumerEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ConsumerEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ConsumerEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<ConsumerEvent> {
        self.receiver.try_iter().collect()
    }
}
