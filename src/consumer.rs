//! The consumer facade tying ledger, buffer, session and caches together.

use crate::config::ConsumerConfig;
use crate::error::{ConsumerError, Result, ServiceError};
use crate::observers::{ObserverConfig, ObserverFilter, ObserverHandle, ObserverId};
use crate::service::{
    HistoryQuery, IdentityProvider, RangeResponse, SendReceipt, SendRequest, StreamClient,
};
use crate::state::{LoadingGuard, SharedState};
use crate::status::StatusCache;
use crate::transport::{ActiveSession, TransportPlan};
use crate::types::{
    Message, MessageId, MessageKind, Offset, ReadReceiptPayload, SessionParams, SessionState,
    StreamHealth, StreamInfo, Timestamp, TransportKind, TypingPayload,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Point-in-time view of the consumer.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsumerSnapshot {
    pub session: SessionState,
    pub connected: bool,
    pub loading: bool,
    pub error: Option<ConsumerError>,
    pub current_offset: Offset,
    pub message_count: usize,
}

/// Client-side engine keeping a gap-free, offset-ordered view of a stream.
///
/// Provides:
/// - One push or pull session at a time, resumable from the last offset
/// - History loads and range backfill merged into the same buffer
/// - Best-effort publishing (messages, typing, read receipts)
/// - Observers for everything the consumer republishes
pub struct StreamConsumer {
    config: ConsumerConfig,

    client: Arc<dyn StreamClient>,

    identity: Arc<dyn IdentityProvider>,

    /// Buffer, ledger, flags and error slot.
    shared: Arc<SharedState>,

    status: StatusCache,

    /// The live session, if any.
    session: Mutex<Option<ActiveSession>>,

    /// Parameters of the most recent session, reused by `reconnect`.
    last_params: Mutex<Option<SessionParams>>,

    initialized: AtomicBool,
}

impl StreamConsumer {
    pub fn new(
        client: Arc<dyn StreamClient>,
        identity: Arc<dyn IdentityProvider>,
        config: ConsumerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: SharedState::new(config.from_offset),
            config,
            client,
            identity,
            status: StatusCache::new(),
            session: Mutex::new(None),
            last_params: Mutex::new(None),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    // --- Lifecycle ---

    /// Set up the underlying client. Must succeed before any session starts.
    ///
    /// A failure lands in the error slot; the caller decides when to retry.
    pub async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        match self.client.init().await {
            Ok(()) => {
                self.initialized.store(true, Ordering::SeqCst);
                if self
                    .shared
                    .read(|s| matches!(s.error, Some(ConsumerError::Initialization(_))))
                {
                    self.shared.clear_error();
                }
                tracing::info!("stream client initialized");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "stream client initialization failed");
                let error = ConsumerError::Initialization(err);
                self.shared.set_error(error.clone());
                Err(error)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Start a session for the signed-in user, scoped by `with_user` and
    /// resuming from the current offset.
    pub async fn start(&self) -> Result<()> {
        let user_id = self.require_user()?;
        let params = SessionParams {
            user_id,
            peer: self.config.with_user.clone(),
            from_offset: self.current_offset(),
        };
        self.connect(params).await
    }

    /// Replace any running session with a new one.
    ///
    /// Resolves once the push handshake or first poll has completed. Failures
    /// are also left in the error slot; a pull session keeps polling after a
    /// failed first poll.
    pub async fn connect(&self, params: SessionParams) -> Result<()> {
        self.require_ready()?;

        let plan = self.transport_plan();
        let ready = {
            let mut session = self.session.lock();
            // Cancel the old task before the new one exists.
            drop(session.take());
            let (active, ready) = ActiveSession::start(
                Arc::clone(&self.client),
                Arc::clone(&self.shared),
                params.clone(),
                plan,
            );
            *session = Some(active);
            ready
        };
        *self.last_params.lock() = Some(params);

        match ready.await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(err),
            // Superseded by another connect or a disconnect.
            Err(_) => Ok(()),
        }
    }

    /// Stop the current session. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let mut slot = self.session.lock();
        let session = slot.take();
        let torn_down = self.shared.end_session();
        drop(slot);
        if let Some(session) = session {
            tracing::info!(user = %session.params().user_id, "disconnecting stream session");
        } else if torn_down {
            tracing::debug!("clearing finished stream session");
        }
    }

    /// Tear down and start again from the current offset with the same
    /// user and peer.
    ///
    /// Refused with `NoIdentity` once the signed-in user no longer matches
    /// the one the last session ran as.
    pub async fn reconnect(&self) -> Result<()> {
        let user_id = self.require_user()?;
        let params = match self.last_params.lock().clone() {
            Some(params) if params.user_id != user_id => {
                tracing::warn!(
                    previous = %params.user_id,
                    "identity changed since last session, not reconnecting"
                );
                return Err(ConsumerError::NoIdentity);
            }
            Some(params) => params,
            None => SessionParams {
                user_id,
                peer: self.config.with_user.clone(),
                from_offset: Offset::ZERO,
            },
        };

        let params = params.from_offset(self.current_offset());
        tracing::info!(from_offset = params.from_offset.0, "reconnecting stream session");
        self.connect(params).await
    }

    // --- Publishing ---

    /// Publish a message. The buffer is not touched; the echo, if any,
    /// arrives through the live session.
    pub async fn send_message(
        &self,
        recipient_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<SendReceipt> {
        let sender_id = self.require_ready()?;
        let receipt = self
            .client
            .send_message(SendRequest {
                sender_id,
                recipient_id: recipient_id.to_string(),
                content: content.to_string(),
                kind,
            })
            .await
            .map_err(ConsumerError::Request)?;

        if !receipt.success {
            return Err(ConsumerError::Request(ServiceError::Rejected(
                "message not accepted".to_string(),
            )));
        }
        Ok(receipt)
    }

    /// Best-effort typing indicator.
    pub async fn send_typing(&self, recipient_id: &str, is_typing: bool) {
        let result = match serde_json::to_string(&TypingPayload { is_typing }) {
            Ok(content) => {
                self.send_message(recipient_id, &content, MessageKind::Typing)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(err) = result {
            tracing::debug!(error = %err, recipient = recipient_id, "typing signal not sent");
        }
    }

    /// Best-effort read receipt.
    pub async fn send_read_receipt(&self, recipient_id: &str, message_id: &MessageId) {
        let payload = ReadReceiptPayload {
            message_id: message_id.clone(),
            read_at: Timestamp::now(),
        };
        let result = match serde_json::to_string(&payload) {
            Ok(content) => {
                self.send_message(recipient_id, &content, MessageKind::ReadReceipt)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(err) = result {
            tracing::debug!(error = %err, message = %message_id, "read receipt not sent");
        }
    }

    // --- Backfill ---

    /// Replace the buffer with the most recent `limit` messages.
    ///
    /// Scoped to the peer of the last session, or `with_user` before any.
    /// Returns the number of messages now buffered.
    pub async fn load_history(&self, limit: usize) -> Result<usize> {
        let user_id = self.require_ready()?;
        let peer = match self.last_params.lock().as_ref() {
            Some(params) => params.peer.clone(),
            None => self.config.with_user.clone(),
        };
        let _loading = LoadingGuard::new(&self.shared);

        let messages = self
            .client
            .get_messages(HistoryQuery {
                user_id,
                peer,
                from_offset: Offset::ZERO,
                limit,
            })
            .await
            .map_err(ConsumerError::Request)?;

        let count = self.shared.replace_history(messages);
        tracing::debug!(count, "history loaded");
        Ok(count)
    }

    /// `load_history` with the configured default limit.
    pub async fn load_latest(&self) -> Result<usize> {
        self.load_history(self.config.history_limit).await
    }

    /// Fetch a bounded window and merge it into the buffer.
    ///
    /// The raw response is returned so callers can page from `end_offset`.
    pub async fn load_range(
        &self,
        start: Offset,
        end: Option<Offset>,
        limit: usize,
    ) -> Result<RangeResponse> {
        self.require_ready()?;
        let _loading = LoadingGuard::new(&self.shared);

        let range = self
            .client
            .get_messages_range(start, end, limit)
            .await
            .map_err(ConsumerError::Request)?;

        let added = self.shared.merge_range(&range);
        tracing::debug!(
            start = start.0,
            end_offset = range.end_offset.0,
            added,
            "range merged"
        );
        Ok(range)
    }

    /// Delete upstream, then locally once the service confirms.
    pub async fn delete_message(&self, id: &MessageId) -> Result<bool> {
        self.require_ready()?;
        let deleted = self
            .client
            .delete_message(id)
            .await
            .map_err(ConsumerError::Request)?;

        if deleted {
            self.shared.remove(id);
        } else {
            tracing::warn!(message = %id, "service did not delete message");
        }
        Ok(deleted)
    }

    // --- Stream Status ---

    /// Refresh cached stream metadata. Failures are logged only.
    pub async fn refresh_stream_info(&self) -> Option<StreamInfo> {
        if let Err(err) = self.require_ready() {
            tracing::debug!(error = %err, "skipping stream info refresh");
            return None;
        }
        match self.client.stream_info().await {
            Ok(info) => {
                self.status.record_info(info.clone());
                Some(info)
            }
            Err(err) => {
                tracing::warn!(error = %err, "stream info refresh failed");
                None
            }
        }
    }

    /// Refresh cached health. Failures are logged only.
    pub async fn check_health(&self) -> Option<StreamHealth> {
        if let Err(err) = self.require_ready() {
            tracing::debug!(error = %err, "skipping health check");
            return None;
        }
        match self.client.check_health().await {
            Ok(health) => {
                self.status.record_health(health.clone());
                Some(health)
            }
            Err(err) => {
                tracing::warn!(error = %err, "health check failed");
                None
            }
        }
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.status.info()
    }

    pub fn stream_health(&self) -> Option<StreamHealth> {
        self.status.health()
    }

    pub fn status(&self) -> &StatusCache {
        &self.status
    }

    // --- Observation ---

    pub fn snapshot(&self) -> ConsumerSnapshot {
        self.shared.read(|s| ConsumerSnapshot {
            session: s.session,
            connected: s.connected,
            loading: s.loads > 0,
            error: s.error.clone(),
            current_offset: s.ledger.current(),
            message_count: s.buffer.len(),
        })
    }

    /// Buffered messages in offset order.
    pub fn messages(&self) -> Vec<Message> {
        self.shared.read(|s| s.buffer.to_vec())
    }

    /// Buffered messages exchanged with `peer`.
    pub fn conversation(&self, peer: &str) -> Vec<Message> {
        self.shared.read(|s| s.buffer.conversation(peer))
    }

    pub fn current_offset(&self) -> Offset {
        self.shared.read(|s| s.ledger.current())
    }

    pub fn is_connected(&self) -> bool {
        self.shared.read(|s| s.connected)
    }

    pub fn is_loading(&self) -> bool {
        self.shared.read(|s| s.loads > 0)
    }

    pub fn session_state(&self) -> SessionState {
        self.shared.read(|s| s.session)
    }

    /// Transport of the running session, if any.
    pub fn transport(&self) -> Option<TransportKind> {
        self.session.lock().as_ref().map(|s| s.kind())
    }

    pub fn last_error(&self) -> Option<ConsumerError> {
        self.shared.read(|s| s.error.clone())
    }

    pub fn clear_error(&self) {
        self.shared.clear_error();
    }

    /// Observe with the configured buffer size.
    pub fn subscribe(&self, filter: ObserverFilter) -> ObserverHandle {
        self.subscribe_with(ObserverConfig {
            buffer_size: self.config.observer_buffer_size,
            filter,
        })
    }

    pub fn subscribe_with(&self, config: ObserverConfig) -> ObserverHandle {
        self.shared.observers().subscribe(config)
    }

    pub fn unsubscribe(&self, id: ObserverId) {
        self.shared.observers().unsubscribe(id);
    }

    // --- Helpers ---

    fn transport_plan(&self) -> TransportPlan {
        match self.config.transport() {
            TransportKind::Push => TransportPlan::Push,
            TransportKind::Pull => TransportPlan::Pull {
                interval: self.config.poll_interval,
                window_seconds: self.config.poll_window_seconds,
            },
        }
    }

    fn require_user(&self) -> Result<String> {
        self.identity.user_id().ok_or(ConsumerError::NoIdentity)
    }

    /// Initialized and signed in; returns the user id.
    fn require_ready(&self) -> Result<String> {
        if !self.is_initialized() {
            return Err(ConsumerError::NotInitialized);
        }
        self.require_user()
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            drop(session);
            self.shared.end_session();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{HostIdentity, MemoryStreamService};

    fn consumer(service: &Arc<MemoryStreamService>, identity: HostIdentity) -> StreamConsumer {
        StreamConsumer::new(
            service.clone(),
            Arc::new(identity),
            ConsumerConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_operations_rejected_before_initialize() {
        let service = Arc::new(MemoryStreamService::new("chat"));
        let consumer = consumer(&service, HostIdentity::new("alice"));

        assert_eq!(
            consumer.connect(SessionParams::new("alice")).await,
            Err(ConsumerError::NotInitialized)
        );
        assert_eq!(
            consumer.load_history(10).await,
            Err(ConsumerError::NotInitialized)
        );
        assert!(consumer.refresh_stream_info().await.is_none());
        assert_eq!(service.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_no_identity_means_no_network() {
        let service = Arc::new(MemoryStreamService::new("chat"));
        let consumer = consumer(&service, HostIdentity::anonymous());
        consumer.initialize().await.unwrap();

        assert_eq!(consumer.start().await, Err(ConsumerError::NoIdentity));
        assert_eq!(
            consumer
                .send_message("bob", "hi", MessageKind::Text)
                .await
                .unwrap_err(),
            ConsumerError::NoIdentity
        );
        assert_eq!(service.connect_count(), 0);
        assert!(service.stored_messages().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_connect_stays_offline() {
        let service = Arc::new(MemoryStreamService::new("chat"));
        let consumer = consumer(&service, HostIdentity::anonymous());
        consumer.initialize().await.unwrap();

        assert_eq!(
            consumer.connect(SessionParams::new("mallory")).await,
            Err(ConsumerError::NoIdentity)
        );
        assert_eq!(consumer.reconnect().await, Err(ConsumerError::NoIdentity));
        assert_eq!(service.connect_count(), 0);
        assert_eq!(consumer.transport(), None);
    }

    #[tokio::test]
    async fn test_initialize_failure_sets_error_slot() {
        let service = Arc::new(MemoryStreamService::new("chat"));
        service.set_fail_init(true);
        let consumer = consumer(&service, HostIdentity::new("alice"));

        let result = consumer.initialize().await;
        assert!(matches!(result, Err(ConsumerError::Initialization(_))));
        assert!(matches!(
            consumer.last_error(),
            Some(ConsumerError::Initialization(_))
        ));
        assert!(!consumer.is_initialized());

        service.set_fail_init(false);
        consumer.initialize().await.unwrap();
        assert!(consumer.last_error().is_none());
    }

    #[tokio::test]
    async fn test_config_validated() {
        let service = Arc::new(MemoryStreamService::new("chat"));
        let config = ConsumerConfig {
            observer_buffer_size: 0,
            ..Default::default()
        };
        let result = StreamConsumer::new(service, Arc::new(HostIdentity::new("alice")), config);
        assert!(matches!(result, Err(ConsumerError::InvalidConfig(_))));
    }
}
