//! Shared helpers for consumer integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use stream_consumer::{
    ConsumerConfig, HostIdentity, Message, MemoryStreamService, StreamConsumer,
};

pub fn service() -> Arc<MemoryStreamService> {
    Arc::new(MemoryStreamService::new("chat"))
}

pub fn consumer_with(service: &Arc<MemoryStreamService>, config: ConsumerConfig) -> StreamConsumer {
    StreamConsumer::new(service.clone(), Arc::new(HostIdentity::new("alice")), config).unwrap()
}

/// Route consumer logs to the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub async fn ready_consumer(
    service: &Arc<MemoryStreamService>,
    config: ConsumerConfig,
) -> StreamConsumer {
    init_tracing();
    let consumer = consumer_with(service, config);
    consumer.initialize().await.unwrap();
    consumer
}

/// Message between alice and bob with a fixed id and offset.
pub fn chat(id: &str, offset: u64) -> Message {
    Message::text(id, offset, "bob", "alice", format!("message {}", id))
}

pub fn offsets(consumer: &StreamConsumer) -> Vec<u64> {
    consumer.messages().iter().map(|m| m.offset.0).collect()
}

/// Poll `check` until it holds, yielding to background tasks in between.
pub async fn eventually<F>(what: &str, check: F)
where
    F: Fn() -> bool,
{
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}
