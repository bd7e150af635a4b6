//! Push strategy: read a server-sent stream until it fails or closes.

use super::Ready;
use crate::error::ConsumerError;
use crate::service::{ConnectRequest, PushEvent, StreamClient};
use crate::state::SharedState;
use crate::types::{SessionParams, TransportKind};
use std::sync::Arc;
use tokio::sync::oneshot;

pub(super) async fn run_push_session(
    client: Arc<dyn StreamClient>,
    shared: Arc<SharedState>,
    epoch: u64,
    params: SessionParams,
    ready: oneshot::Sender<Ready>,
) {
    let request = ConnectRequest {
        user_id: params.user_id,
        peer: params.peer,
        from_offset: params.from_offset,
    };

    let mut connection = match client.connect(request).await {
        Ok(connection) => connection,
        Err(err) => {
            tracing::warn!(error = %err, epoch, "push connect failed");
            shared.transport_failed(epoch, err.clone(), true);
            let _ = ready.send(Err(ConsumerError::Transport(err)));
            return;
        }
    };

    if !shared.session_active(epoch, TransportKind::Push, connection.start_offset) {
        return;
    }
    tracing::info!(offset = connection.start_offset.0, epoch, "push stream connected");
    let _ = ready.send(Ok(connection.start_offset));

    while let Some(event) = connection.events.recv().await {
        match event {
            PushEvent::Message(message) => {
                if !shared.ingest_live(epoch, message) {
                    return;
                }
            }
            PushEvent::Error(err) => {
                tracing::warn!(error = %err, epoch, "push stream failed");
                shared.transport_failed(epoch, err, true);
                return;
            }
        }
    }

    tracing::info!(epoch, "push stream closed by server");
    shared.stream_closed(epoch);
}
