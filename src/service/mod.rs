//! Contract with the remote stream service and the host identity provider.
//!
//! The consumer never talks to the network directly; everything goes
//! through a [`StreamClient`]. [`MemoryStreamService`] is an in-process
//! implementation for tests and demos.

mod memory;

pub use memory::MemoryStreamService;

use crate::error::ServiceError;
use crate::types::{Message, MessageId, MessageKind, Offset, StreamHealth, StreamInfo};
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

/// Result type for service calls.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Request to open a push stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    pub user_id: String,
    pub peer: Option<String>,
    pub from_offset: Offset,
}

/// One item delivered over a push stream.
#[derive(Clone, Debug)]
pub enum PushEvent {
    Message(Message),
    /// Transport failure. The stream is unusable afterwards.
    Error(ServiceError),
}

/// An open push stream.
///
/// The service closes the stream by dropping its sender; the consumer
/// disconnects by dropping this value.
#[derive(Debug)]
pub struct PushConnection {
    /// Offset the service acknowledged as the starting point.
    pub start_offset: Offset,
    pub events: mpsc::Receiver<PushEvent>,
}

/// One long-poll request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollRequest {
    pub user_id: String,
    pub peer: Option<String>,
    pub window_seconds: u64,
}

#[derive(Clone, Debug, Default)]
pub struct PollResponse {
    pub messages: Vec<Message>,
}

/// Message to publish.
#[derive(Clone, Debug, PartialEq)]
pub struct SendRequest {
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub kind: MessageKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    pub success: bool,
    pub message_id: Option<MessageId>,
}

/// History query: the most recent `limit` messages at or after `from_offset`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryQuery {
    pub user_id: String,
    pub peer: Option<String>,
    pub from_offset: Offset,
    pub limit: usize,
}

/// Bounded window of the stream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RangeResponse {
    pub messages: Vec<Message>,
    /// Last offset the service covered; the next page starts after it.
    pub end_offset: Offset,
}

/// Operations the consumer needs from the remote stream service.
#[async_trait]
pub trait StreamClient: Send + Sync {
    /// One-time client setup.
    async fn init(&self) -> ServiceResult<()>;

    /// Open a push stream scoped to a user, optionally to one counterpart.
    async fn connect(&self, request: ConnectRequest) -> ServiceResult<PushConnection>;

    async fn poll(&self, request: PollRequest) -> ServiceResult<PollResponse>;

    async fn send_message(&self, request: SendRequest) -> ServiceResult<SendReceipt>;

    async fn get_messages(&self, query: HistoryQuery) -> ServiceResult<Vec<Message>>;

    /// Messages with `start <= offset <= end`, at most `limit`.
    async fn get_messages_range(
        &self,
        start: Offset,
        end: Option<Offset>,
        limit: usize,
    ) -> ServiceResult<RangeResponse>;

    /// Returns whether the service deleted the message.
    async fn delete_message(&self, id: &MessageId) -> ServiceResult<bool>;

    async fn stream_info(&self) -> ServiceResult<StreamInfo>;

    async fn check_health(&self) -> ServiceResult<StreamHealth>;
}

/// Supplies the authenticated user, if any.
pub trait IdentityProvider: Send + Sync {
    fn user_id(&self) -> Option<String>;
}

/// Identity the host sets and clears as the user signs in and out.
#[derive(Debug, Default)]
pub struct HostIdentity {
    user_id: RwLock<Option<String>>,
}

impl HostIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: RwLock::new(Some(user_id.into())),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.user_id.write() = Some(user_id.into());
    }

    pub fn sign_out(&self) {
        *self.user_id.write() = None;
    }
}

impl IdentityProvider for HostIdentity {
    fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }
}
