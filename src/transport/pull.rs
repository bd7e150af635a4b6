//! Pull strategy: poll immediately, then on a fixed interval.
//!
//! A failed poll is reported but never ends the loop; the next tick retries.

use super::Ready;
use crate::error::ConsumerError;
use crate::service::{PollRequest, StreamClient};
use crate::state::SharedState;
use crate::types::{SessionParams, TransportKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

pub(super) struct PollSchedule {
    pub(super) interval: Duration,
    pub(super) window_seconds: u64,
}

pub(super) async fn run_pull_session(
    client: Arc<dyn StreamClient>,
    shared: Arc<SharedState>,
    epoch: u64,
    schedule: PollSchedule,
    params: SessionParams,
    ready: oneshot::Sender<Ready>,
) {
    let request = PollRequest {
        user_id: params.user_id,
        peer: params.peer,
        window_seconds: schedule.window_seconds,
    };

    let mut ready = Some(ready);
    let mut ticker = tokio::time::interval(schedule.interval);
    // A slow poll pushes the schedule back instead of firing a burst.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !shared.is_current(epoch) {
            return;
        }

        match client.poll(request.clone()).await {
            Ok(response) => {
                let count = response.messages.len();
                if !shared.ingest_batch(epoch, response.messages) {
                    tracing::debug!(epoch, count, "discarding poll result from stale session");
                    return;
                }
                let offset = shared.read(|s| s.ledger.current());
                if !shared.session_active(epoch, TransportKind::Pull, offset) {
                    return;
                }
                tracing::debug!(epoch, count, offset = offset.0, "poll completed");
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(offset));
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, epoch, "poll failed, retrying next tick");
                if !shared.transport_failed(epoch, err.clone(), false) {
                    return;
                }
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Err(ConsumerError::Transport(err)));
                }
            }
        }
    }
}
