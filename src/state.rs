//! State shared between the consumer and its transport session.
//!
//! Buffer, ledger, connection flags and the error slot live behind one lock
//! so every mutation is atomic with respect to the ordered view. Session
//! tasks tag their mutations with the epoch they were started under; once a
//! newer session (or a disconnect) bumps the epoch, those mutations are
//! rejected.

use crate::buffer::MergeBuffer;
use crate::error::{ConsumerError, ServiceError};
use crate::ledger::OffsetLedger;
use crate::observers::{ConsumerEvent, ObserverRegistry};
use crate::service::RangeResponse;
use crate::types::{Message, MessageId, Offset, SessionState, TransportKind};
use parking_lot::Mutex;
use std::sync::Arc;

/// Everything the consumer exposes, guarded as one unit.
#[derive(Debug, Default)]
pub(crate) struct ConsumerState {
    pub(crate) buffer: MergeBuffer,
    pub(crate) ledger: OffsetLedger,
    pub(crate) session: SessionState,
    pub(crate) connected: bool,
    /// In-flight history/range loads.
    pub(crate) loads: usize,
    pub(crate) error: Option<ConsumerError>,
    /// Bumped whenever a session starts or is torn down.
    pub(crate) epoch: u64,
}

pub(crate) struct SharedState {
    inner: Mutex<ConsumerState>,
    observers: ObserverRegistry,
}

impl SharedState {
    pub(crate) fn new(initial_offset: Offset) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(ConsumerState {
                ledger: OffsetLedger::new(initial_offset),
                ..Default::default()
            }),
            observers: ObserverRegistry::new(),
        })
    }

    pub(crate) fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// Run `f` with read access to the state.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&ConsumerState) -> R) -> R {
        let state = self.inner.lock();
        f(&*state)
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.inner.lock().epoch == epoch
    }

    // --- Session Lifecycle ---

    /// Invalidate any previous session and enter `Connecting`.
    pub(crate) fn begin_session(&self, kind: TransportKind) -> u64 {
        let mut state = self.inner.lock();
        let was_connected = state.connected;
        state.epoch += 1;
        state.session = SessionState::Connecting(kind);
        state.connected = false;
        if was_connected {
            self.observers.broadcast(ConsumerEvent::Disconnected);
        }
        state.epoch
    }

    /// Invalidate the current session and go idle.
    ///
    /// Returns false if there was nothing to tear down.
    pub(crate) fn end_session(&self) -> bool {
        let mut state = self.inner.lock();
        state.epoch += 1;
        if state.session == SessionState::Idle {
            return false;
        }
        let was_connected = state.connected;
        state.session = SessionState::Idle;
        state.connected = false;
        if was_connected {
            self.observers.broadcast(ConsumerEvent::Disconnected);
        }
        true
    }

    /// A session handshake (push) or first poll (pull) completed.
    pub(crate) fn session_active(&self, epoch: u64, kind: TransportKind, offset: Offset) -> bool {
        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return false;
        }
        let newly_connected = !state.connected;
        state.session = SessionState::Active(kind);
        state.connected = true;
        state.ledger.advance(offset);
        if matches!(state.error, Some(ConsumerError::Transport(_))) {
            state.error = None;
        }
        if newly_connected {
            self.observers.broadcast(ConsumerEvent::Connected {
                transport: kind,
                offset: state.ledger.current(),
            });
        }
        true
    }

    /// A transport failure for the session tagged `epoch`.
    ///
    /// Terminal failures move the session to `Errored`; pull sessions report
    /// non-terminal failures and keep polling.
    pub(crate) fn transport_failed(&self, epoch: u64, error: ServiceError, terminal: bool) -> bool {
        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return false;
        }
        let was_connected = state.connected;
        let error = ConsumerError::Transport(error);
        state.error = Some(error.clone());
        state.connected = false;
        if terminal {
            state.session = SessionState::Errored;
        }
        self.observers.broadcast(ConsumerEvent::Error { error });
        if was_connected {
            self.observers.broadcast(ConsumerEvent::Disconnected);
        }
        true
    }

    /// The remote side closed the push stream without an error.
    pub(crate) fn stream_closed(&self, epoch: u64) -> bool {
        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return false;
        }
        let was_connected = state.connected;
        state.session = SessionState::Closed;
        state.connected = false;
        if was_connected {
            self.observers.broadcast(ConsumerEvent::Disconnected);
        }
        true
    }

    pub(crate) fn set_error(&self, error: ConsumerError) {
        let mut state = self.inner.lock();
        state.error = Some(error.clone());
        self.observers.broadcast(ConsumerEvent::Error { error });
    }

    pub(crate) fn clear_error(&self) {
        self.inner.lock().error = None;
    }

    // --- Live Ingestion ---

    /// One message from a push stream. Returns false if the session is stale.
    pub(crate) fn ingest_live(&self, epoch: u64, message: Message) -> bool {
        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return false;
        }
        state.ledger.advance(message.offset);
        if state.buffer.insert(message.clone()) {
            self.observers
                .broadcast(ConsumerEvent::MessageReceived { message });
        }
        true
    }

    /// One poll batch. Returns false if the session is stale.
    pub(crate) fn ingest_batch(&self, epoch: u64, messages: Vec<Message>) -> bool {
        let mut state = self.inner.lock();
        if state.epoch != epoch {
            return false;
        }
        state
            .ledger
            .advance_to_max(messages.iter().map(|m| m.offset));
        let added = state.buffer.insert_batch(messages);
        if added > 0 {
            self.observers.broadcast(ConsumerEvent::MessagesChanged {
                count: state.buffer.len(),
                current_offset: state.ledger.current(),
            });
        }
        true
    }

    // --- Request-Driven Mutation ---

    /// Replace the buffer with a history snapshot.
    pub(crate) fn replace_history(&self, messages: Vec<Message>) -> usize {
        let mut state = self.inner.lock();
        let last = messages.iter().map(|m| m.offset).max();
        state.buffer.replace_all(messages);
        if let Some(last) = last {
            state.ledger.advance(last);
        }
        self.observers.broadcast(ConsumerEvent::MessagesChanged {
            count: state.buffer.len(),
            current_offset: state.ledger.current(),
        });
        state.buffer.len()
    }

    /// Merge a range read without discarding anything already buffered.
    pub(crate) fn merge_range(&self, range: &RangeResponse) -> usize {
        let mut state = self.inner.lock();
        let added = state.buffer.insert_batch(range.messages.iter().cloned());
        state.ledger.advance(range.end_offset);
        self.observers.broadcast(ConsumerEvent::MessagesChanged {
            count: state.buffer.len(),
            current_offset: state.ledger.current(),
        });
        added
    }

    pub(crate) fn remove(&self, id: &MessageId) -> bool {
        let mut state = self.inner.lock();
        let removed = state.buffer.remove(id);
        if removed {
            self.observers
                .broadcast(ConsumerEvent::MessageRemoved { id: id.clone() });
        }
        removed
    }

    pub(crate) fn begin_loading(&self) {
        let mut state = self.inner.lock();
        state.loads += 1;
        if state.loads == 1 {
            self.observers
                .broadcast(ConsumerEvent::Loading { active: true });
        }
    }

    pub(crate) fn end_loading(&self) {
        let mut state = self.inner.lock();
        state.loads = state.loads.saturating_sub(1);
        if state.loads == 0 {
            self.observers
                .broadcast(ConsumerEvent::Loading { active: false });
        }
    }
}

/// Holds the loading flag up for as long as it lives, including when the
/// owning future is dropped mid-request.
pub(crate) struct LoadingGuard {
    shared: Arc<SharedState>,
}

impl LoadingGuard {
    pub(crate) fn new(shared: &Arc<SharedState>) -> Self {
        shared.begin_loading();
        Self {
            shared: Arc::clone(shared),
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.shared.end_loading();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, offset: u64) -> Message {
        Message::text(id, offset, "alice", "bob", "hi")
    }

    #[test]
    fn test_stale_epoch_rejected() {
        let shared = SharedState::new(Offset::ZERO);
        let old = shared.begin_session(TransportKind::Pull);
        let new = shared.begin_session(TransportKind::Pull);
        assert_ne!(old, new);

        assert!(!shared.ingest_batch(old, vec![msg("a", 1)]));
        assert!(!shared.ingest_live(old, msg("b", 2)));
        assert!(!shared.session_active(old, TransportKind::Pull, Offset(3)));
        assert!(shared.read(|s| s.buffer.is_empty()));

        assert!(shared.ingest_batch(new, vec![msg("a", 1)]));
        assert_eq!(shared.read(|s| s.buffer.len()), 1);
    }

    #[test]
    fn test_end_session_invalidates() {
        let shared = SharedState::new(Offset::ZERO);
        let epoch = shared.begin_session(TransportKind::Push);
        assert!(shared.session_active(epoch, TransportKind::Push, Offset(4)));

        assert!(shared.end_session());
        assert!(!shared.end_session());
        assert!(!shared.ingest_live(epoch, msg("late", 9)));
        shared.read(|s| {
            assert_eq!(s.session, SessionState::Idle);
            assert!(!s.connected);
            assert_eq!(s.ledger.current(), Offset(4));
        });
    }

    #[test]
    fn test_non_terminal_failure_keeps_session() {
        let shared = SharedState::new(Offset::ZERO);
        let epoch = shared.begin_session(TransportKind::Pull);
        shared.session_active(epoch, TransportKind::Pull, Offset::ZERO);

        shared.transport_failed(epoch, ServiceError::Closed, false);
        shared.read(|s| {
            assert_eq!(s.session, SessionState::Active(TransportKind::Pull));
            assert!(!s.connected);
            assert!(matches!(s.error, Some(ConsumerError::Transport(_))));
        });

        // Recovery clears the transport error.
        shared.session_active(epoch, TransportKind::Pull, Offset::ZERO);
        shared.read(|s| {
            assert!(s.connected);
            assert!(s.error.is_none());
        });
    }

    #[test]
    fn test_range_merge_does_not_lower_cursor() {
        let shared = SharedState::new(Offset(30));
        shared.merge_range(&RangeResponse {
            messages: vec![msg("a", 10), msg("b", 12)],
            end_offset: Offset(12),
        });
        shared.read(|s| {
            assert_eq!(s.buffer.len(), 2);
            assert_eq!(s.ledger.current(), Offset(30));
        });
    }

    #[test]
    fn test_loading_guard_nests() {
        let shared = SharedState::new(Offset::ZERO);
        let outer = LoadingGuard::new(&shared);
        let inner = LoadingGuard::new(&shared);
        drop(inner);
        assert_eq!(shared.read(|s| s.loads), 1);
        drop(outer);
        assert_eq!(shared.read(|s| s.loads), 0);
    }
}
