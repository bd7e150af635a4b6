//! # Stream Consumer
//!
//! A client-side engine that keeps a locally consistent, gap-free view of an
//! append-only, offset-addressed message stream, over either a push stream or
//! periodic long-polling.
//!
//! ## Core Concepts
//!
//! - **Offsets**: Every message has a position; the consumer tracks the
//!   highest one seen and resumes from it
//! - **Merge buffer**: Messages from every path are deduplicated by id and
//!   kept in offset order
//! - **Sessions**: Exactly one push or pull session runs at a time; stale
//!   sessions can never touch the buffer
//! - **Observers**: Buffer, offset and connection changes are republished
//!   over bounded channels
//!
//! ## Example
//!
//! ```ignore
//! use stream_consumer::{ConsumerConfig, HostIdentity, MemoryStreamService, StreamConsumer};
//!
//! let service = Arc::new(MemoryStreamService::new("chat"));
//! let consumer = StreamConsumer::new(
//!     service,
//!     Arc::new(HostIdentity::new("alice")),
//!     ConsumerConfig::default().with_user("bob"),
//! )?;
//!
//! consumer.initialize().await?;
//! consumer.load_latest().await?;
//! consumer.start().await?;
//!
//! for message in consumer.messages() {
//!     println!("{}: {}", message.offset, message.content);
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod consumer;
pub mod error;
pub mod ledger;
pub mod observers;
pub mod service;
mod state;
pub mod status;
mod transport;
pub mod types;

// Re-exports
pub use buffer::MergeBuffer;
pub use config::ConsumerConfig;
pub use consumer::{ConsumerSnapshot, StreamConsumer};
pub use error::{ConsumerError, Result, ServiceError};
pub use ledger::OffsetLedger;
pub use observers::{
    ConsumerEvent, DropReason, ObserverConfig, ObserverFilter, ObserverHandle, ObserverId,
    ObserverRegistry,
};
pub use service::{
    ConnectRequest, HistoryQuery, HostIdentity, IdentityProvider, MemoryStreamService,
    PollRequest, PollResponse, PushConnection, PushEvent, RangeResponse, SendReceipt,
    SendRequest, ServiceResult, StreamClient,
};
pub use status::{Cached, StatusCache};
pub use types::*;
