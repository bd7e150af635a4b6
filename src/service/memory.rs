//! In-process stream service.
//!
//! Keeps the whole stream in memory, assigns offsets on append and fans new
//! messages out to open push streams. Fault switches let tests drive the
//! consumer through failed polls, broken streams and rejected requests.

use super::{
    ConnectRequest, HistoryQuery, PollRequest, PollResponse, PushConnection, PushEvent,
    RangeResponse, SendReceipt, SendRequest, ServiceResult, StreamClient,
};
use crate::error::ServiceError;
use crate::types::{Message, MessageId, MessageKind, Offset, StreamHealth, StreamInfo, Timestamp};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

/// Buffered events per push stream before the service gives up on it.
const PUSH_QUEUE_DEPTH: usize = 1024;

struct PushSubscriber {
    user_id: String,
    peer: Option<String>,
    sender: mpsc::Sender<PushEvent>,
}

impl PushSubscriber {
    fn wants(&self, message: &Message) -> bool {
        scoped_to(message, &self.user_id, self.peer.as_deref())
    }
}

fn scoped_to(message: &Message, user_id: &str, peer: Option<&str>) -> bool {
    if !message.involves(user_id) {
        return false;
    }
    match peer {
        Some(peer) => message.involves(peer),
        None => true,
    }
}

/// Earliest `created_at` a poll window covers, clamped for huge windows.
fn window_start(now: Timestamp, window_seconds: u64) -> i64 {
    let window_millis = i64::try_from(window_seconds)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000);
    now.0.saturating_sub(window_millis)
}

#[derive(Default)]
struct Faults {
    fail_init: bool,
    fail_connect: bool,
    failing_polls: u32,
    fail_requests: bool,
    fail_deletes: bool,
    healthy: bool,
}

struct MemoryState {
    name: String,
    /// Ascending offset order.
    messages: Vec<Message>,
    next_offset: u64,
    next_id: u64,
    subscribers: Vec<PushSubscriber>,
    faults: Faults,
    initialized: bool,
    poll_count: u64,
    connect_count: u64,
}

impl MemoryState {
    fn tail(&self) -> Offset {
        self.messages.last().map(|m| m.offset).unwrap_or(Offset::ZERO)
    }

    /// Deliver to every matching push stream, pruning dead ones.
    fn fan_out(&mut self, message: &Message) {
        self.subscribers.retain(|sub| {
            if !sub.wants(message) {
                return !sub.sender.is_closed();
            }
            sub.sender.try_send(PushEvent::Message(message.clone())).is_ok()
        });
    }

    fn store(&mut self, message: Message) {
        self.next_offset = self.next_offset.max(message.offset.0 + 1);
        let pos = self
            .messages
            .partition_point(|existing| existing.offset <= message.offset);
        self.messages.insert(pos, message);
    }
}

/// In-memory implementation of [`StreamClient`].
pub struct MemoryStreamService {
    state: Mutex<MemoryState>,
    /// Polls wait until this reads true.
    poll_gate: watch::Sender<bool>,
}

impl MemoryStreamService {
    pub fn new(name: impl Into<String>) -> Self {
        let (poll_gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(MemoryState {
                name: name.into(),
                messages: Vec::new(),
                next_offset: 1,
                next_id: 1,
                subscribers: Vec::new(),
                faults: Faults {
                    healthy: true,
                    ..Default::default()
                },
                initialized: false,
                poll_count: 0,
                connect_count: 0,
            }),
            poll_gate,
        }
    }

    // --- Stream Contents ---

    /// Append a message, assigning the next offset and an id.
    pub fn append(
        &self,
        sender_id: &str,
        recipient_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Message {
        let mut state = self.state.lock();
        let message = Message {
            id: MessageId::new(format!("msg-{}", state.next_id)),
            offset: Offset(state.next_offset),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            content: content.to_string(),
            kind,
            created_at: Timestamp::now(),
        };
        state.next_id += 1;
        state.store(message.clone());
        state.fan_out(&message);
        message
    }

    /// Store a fully formed message as-is (its offset is kept) and fan it out.
    pub fn append_message(&self, message: Message) {
        let mut state = self.state.lock();
        state.store(message.clone());
        state.fan_out(&message);
    }

    /// Push a message to open streams without storing it, as a server would
    /// when re-delivering after a resume.
    pub fn redeliver(&self, message: &Message) {
        self.state.lock().fan_out(message);
    }

    pub fn stored_messages(&self) -> Vec<Message> {
        self.state.lock().messages.clone()
    }

    // --- Fault Injection ---

    pub fn set_fail_init(&self, fail: bool) {
        self.state.lock().faults.fail_init = fail;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().faults.fail_connect = fail;
    }

    /// Make the next `count` polls fail.
    pub fn fail_next_polls(&self, count: u32) {
        self.state.lock().faults.failing_polls = count;
    }

    /// Fail send, history, range, info and health requests.
    pub fn set_fail_requests(&self, fail: bool) {
        self.state.lock().faults.fail_requests = fail;
    }

    /// Report deletes as not performed.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.state.lock().faults.fail_deletes = fail;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().faults.healthy = healthy;
    }

    /// Send a transport error down every open push stream and drop them.
    pub fn break_push_streams(&self, error: ServiceError) {
        let subscribers = std::mem::take(&mut self.state.lock().subscribers);
        for sub in subscribers {
            let _ = sub.sender.try_send(PushEvent::Error(error.clone()));
        }
    }

    /// Close every open push stream cleanly.
    pub fn close_push_streams(&self) {
        self.state.lock().subscribers.clear();
    }

    /// Hold polls in flight until [`release_polls`](Self::release_polls).
    pub fn hold_polls(&self) {
        self.poll_gate.send_replace(false);
    }

    pub fn release_polls(&self) {
        self.poll_gate.send_replace(true);
    }

    // --- Introspection ---

    /// Polls received, including failed and held ones.
    pub fn poll_count(&self) -> u64 {
        self.state.lock().poll_count
    }

    pub fn connect_count(&self) -> u64 {
        self.state.lock().connect_count
    }

    /// Push streams still open on the service side.
    pub fn open_push_streams(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|sub| !sub.sender.is_closed());
        state.subscribers.len()
    }

    fn check_requests(&self) -> ServiceResult<()> {
        if self.state.lock().faults.fail_requests {
            return Err(ServiceError::Server {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StreamClient for MemoryStreamService {
    async fn init(&self) -> ServiceResult<()> {
        let mut state = self.state.lock();
        if state.faults.fail_init {
            return Err(ServiceError::Network("client setup failed".to_string()));
        }
        state.initialized = true;
        Ok(())
    }

    async fn connect(&self, request: ConnectRequest) -> ServiceResult<PushConnection> {
        let mut state = self.state.lock();
        state.connect_count += 1;
        if state.faults.fail_connect {
            return Err(ServiceError::Network("connection refused".to_string()));
        }

        let (sender, events) = mpsc::channel(PUSH_QUEUE_DEPTH);

        // Catch up from the resume point before going live.
        let backlog: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.offset > request.from_offset)
            .filter(|m| scoped_to(m, &request.user_id, request.peer.as_deref()))
            .cloned()
            .collect();
        for message in backlog {
            if sender.try_send(PushEvent::Message(message)).is_err() {
                return Err(ServiceError::Rejected("backlog too large".to_string()));
            }
        }

        state.subscribers.push(PushSubscriber {
            user_id: request.user_id,
            peer: request.peer,
            sender,
        });

        Ok(PushConnection {
            start_offset: request.from_offset,
            events,
        })
    }

    async fn poll(&self, request: PollRequest) -> ServiceResult<PollResponse> {
        self.state.lock().poll_count += 1;

        let opened = {
            let mut gate = self.poll_gate.subscribe();
            let result = gate.wait_for(|open| *open).await;
            result.is_ok()
        };
        if !opened {
            return Err(ServiceError::Closed);
        }

        let mut state = self.state.lock();
        if state.faults.failing_polls > 0 {
            state.faults.failing_polls -= 1;
            return Err(ServiceError::Network("poll timed out".to_string()));
        }

        let window_start = window_start(Timestamp::now(), request.window_seconds);
        let messages = state
            .messages
            .iter()
            .filter(|m| m.created_at.0 >= window_start)
            .filter(|m| scoped_to(m, &request.user_id, request.peer.as_deref()))
            .cloned()
            .collect();
        Ok(PollResponse { messages })
    }

    async fn send_message(&self, request: SendRequest) -> ServiceResult<SendReceipt> {
        self.check_requests()?;
        let message = self.append(
            &request.sender_id,
            &request.recipient_id,
            &request.content,
            request.kind,
        );
        Ok(SendReceipt {
            success: true,
            message_id: Some(message.id),
        })
    }

    async fn get_messages(&self, query: HistoryQuery) -> ServiceResult<Vec<Message>> {
        self.check_requests()?;
        let state = self.state.lock();
        let matching: Vec<&Message> = state
            .messages
            .iter()
            .filter(|m| m.offset >= query.from_offset)
            .filter(|m| scoped_to(m, &query.user_id, query.peer.as_deref()))
            .collect();
        let skip = matching.len().saturating_sub(query.limit);
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    async fn get_messages_range(
        &self,
        start: Offset,
        end: Option<Offset>,
        limit: usize,
    ) -> ServiceResult<RangeResponse> {
        self.check_requests()?;
        let state = self.state.lock();
        let messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.offset >= start && end.map_or(true, |end| m.offset <= end))
            .take(limit)
            .cloned()
            .collect();

        let end_offset = match messages.last() {
            Some(last) => last.offset,
            None => {
                let tail = state.tail();
                end.map_or(tail, |end| end.min(tail))
            }
        };
        Ok(RangeResponse {
            messages,
            end_offset,
        })
    }

    async fn delete_message(&self, id: &MessageId) -> ServiceResult<bool> {
        let mut state = self.state.lock();
        if state.faults.fail_deletes {
            return Ok(false);
        }
        let before = state.messages.len();
        state.messages.retain(|m| &m.id != id);
        Ok(state.messages.len() < before)
    }

    async fn stream_info(&self) -> ServiceResult<StreamInfo> {
        self.check_requests()?;
        let state = self.state.lock();
        Ok(StreamInfo {
            name: state.name.clone(),
            message_count: state.messages.len() as u64,
            first_offset: state.messages.first().map(|m| m.offset).unwrap_or(Offset::ZERO),
            last_offset: state.tail(),
        })
    }

    async fn check_health(&self) -> ServiceResult<StreamHealth> {
        self.check_requests()?;
        let state = self.state.lock();
        let healthy = state.faults.healthy;
        Ok(StreamHealth {
            healthy,
            status: if healthy { "ok" } else { "degraded" }.to_string(),
            checked_at: Timestamp::now(),
        })
    }
}
