//! Long-poll transport tests.

mod common;

use common::{chat, eventually, offsets, ready_consumer, service};
use std::time::Duration;
use stream_consumer::{
    ConsumerConfig, ConsumerError, Offset, SessionParams, SessionState, TransportKind,
};

const INTERVAL: Duration = Duration::from_secs(5);

fn long_poll() -> ConsumerConfig {
    ConsumerConfig::default().with_long_poll(INTERVAL)
}

#[tokio::test(start_paused = true)]
async fn test_first_poll_is_immediate() {
    let service = service();
    service.append_message(chat("m2", 2));
    service.append_message(chat("m1", 1));
    let consumer = ready_consumer(&service, long_poll()).await;

    consumer.connect(SessionParams::new("alice")).await.unwrap();

    assert_eq!(service.poll_count(), 1);
    assert!(consumer.is_connected());
    assert_eq!(
        consumer.session_state(),
        SessionState::Active(TransportKind::Pull)
    );
    assert_eq!(consumer.transport(), Some(TransportKind::Pull));
    assert_eq!(offsets(&consumer), vec![1, 2]);
    assert_eq!(consumer.current_offset(), Offset(2));
}

#[tokio::test(start_paused = true)]
async fn test_polls_on_interval_and_dedups() {
    let service = service();
    service.append_message(chat("m1", 1));
    let consumer = ready_consumer(&service, long_poll()).await;
    consumer.connect(SessionParams::new("alice")).await.unwrap();

    service.append_message(chat("m2", 2));
    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;

    assert_eq!(service.poll_count(), 2);
    // Each poll returns the whole window; m1 must not be doubled.
    assert_eq!(offsets(&consumer), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_poll_keeps_timer_running() {
    let service = service();
    service.append_message(chat("m1", 1));
    service.fail_next_polls(1);
    let consumer = ready_consumer(&service, long_poll()).await;

    let result = consumer.connect(SessionParams::new("alice")).await;
    assert!(matches!(result, Err(ConsumerError::Transport(_))));
    assert!(!consumer.is_connected());
    assert!(matches!(
        consumer.last_error(),
        Some(ConsumerError::Transport(_))
    ));
    assert!(consumer.messages().is_empty());

    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;

    assert_eq!(service.poll_count(), 2);
    assert!(consumer.is_connected());
    assert!(consumer.last_error().is_none());
    assert_eq!(offsets(&consumer), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_failure_after_connect_is_reported_then_recovers() {
    let service = service();
    let consumer = ready_consumer(&service, long_poll()).await;
    consumer.connect(SessionParams::new("alice")).await.unwrap();

    service.fail_next_polls(1);
    tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(service.poll_count(), 2);
    assert!(!consumer.is_connected());
    assert!(consumer.last_error().is_some());
    assert_eq!(
        consumer.session_state(),
        SessionState::Active(TransportKind::Pull)
    );

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(service.poll_count(), 3);
    assert!(consumer.is_connected());
}

#[tokio::test]
async fn test_disconnect_discards_in_flight_poll() {
    let service = service();
    let consumer = ready_consumer(&service, long_poll()).await;

    service.hold_polls();
    // Give up waiting for the first poll; the session keeps running.
    let pending = tokio::time::timeout(
        Duration::from_millis(50),
        consumer.connect(SessionParams::new("alice")),
    )
    .await;
    assert!(pending.is_err());
    eventually("poll in flight", || service.poll_count() == 1).await;

    service.append_message(chat("late", 1));
    consumer.disconnect();
    service.release_polls();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(consumer.messages().is_empty());
    assert!(!consumer.is_connected());
    assert_eq!(consumer.session_state(), SessionState::Idle);
    assert_eq!(consumer.current_offset(), Offset(0));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_polling() {
    let service = service();
    let consumer = ready_consumer(&service, long_poll()).await;
    consumer.connect(SessionParams::new("alice")).await.unwrap();

    consumer.disconnect();
    tokio::time::sleep(INTERVAL * 3).await;

    assert_eq!(service.poll_count(), 1);
    assert_eq!(consumer.transport(), None);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_restarts_polling() {
    let service = service();
    let consumer = ready_consumer(&service, long_poll()).await;
    consumer.connect(SessionParams::new("alice")).await.unwrap();
    assert_eq!(service.poll_count(), 1);

    consumer.reconnect().await.unwrap();
    assert_eq!(service.poll_count(), 2);
    assert!(consumer.is_connected());

    // Only the new session's timer fires.
    tokio::time::sleep(INTERVAL + Duration::from_secs(2)).await;
    assert_eq!(service.poll_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_after_disconnect_restarts_polling() {
    let service = service();
    let consumer = ready_consumer(&service, long_poll()).await;
    consumer.connect(SessionParams::new("alice")).await.unwrap();
    consumer.disconnect();

    consumer.reconnect().await.unwrap();
    assert_eq!(service.poll_count(), 2);
    assert!(consumer.is_connected());
}
