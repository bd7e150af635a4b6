//! Transport sessions.
//!
//! A session owns exactly one background task: a push stream reader or a
//! poll loop. Both report into [`SharedState`] tagged with the epoch the
//! session was started under, so a torn-down session can never mutate the
//! buffer even if its task is still unwinding.

mod pull;
mod push;

use crate::error::ConsumerError;
use crate::service::StreamClient;
use crate::state::SharedState;
use crate::types::{Offset, SessionParams, TransportKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Outcome of a session's handshake (push) or first poll (pull).
pub(crate) type Ready = std::result::Result<Offset, ConsumerError>;

/// How a session should reach the stream.
#[derive(Clone, Debug)]
pub(crate) enum TransportPlan {
    Push,
    Pull {
        interval: Duration,
        window_seconds: u64,
    },
}

impl TransportPlan {
    pub(crate) fn kind(&self) -> TransportKind {
        match self {
            TransportPlan::Push => TransportKind::Push,
            TransportPlan::Pull { .. } => TransportKind::Pull,
        }
    }
}

/// The running half of a session.
enum Transport {
    Push(JoinHandle<()>),
    Pull(JoinHandle<()>),
}

/// A live session. Dropping it cancels its task.
pub(crate) struct ActiveSession {
    epoch: u64,
    params: SessionParams,
    transport: Transport,
}

impl ActiveSession {
    /// Start a session. Any previous session sharing `shared` is invalidated
    /// before the new task is spawned.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start(
        client: Arc<dyn StreamClient>,
        shared: Arc<SharedState>,
        params: SessionParams,
        plan: TransportPlan,
    ) -> (Self, oneshot::Receiver<Ready>) {
        let epoch = shared.begin_session(plan.kind());
        let (ready_tx, ready_rx) = oneshot::channel();

        tracing::info!(
            user = %params.user_id,
            peer = ?params.peer,
            from_offset = params.from_offset.0,
            transport = ?plan.kind(),
            epoch,
            "starting stream session"
        );

        let transport = match plan {
            TransportPlan::Push => Transport::Push(tokio::spawn(push::run_push_session(
                client,
                shared,
                epoch,
                params.clone(),
                ready_tx,
            ))),
            TransportPlan::Pull {
                interval,
                window_seconds,
            } => Transport::Pull(tokio::spawn(pull::run_pull_session(
                client,
                shared,
                epoch,
                pull::PollSchedule {
                    interval,
                    window_seconds,
                },
                params.clone(),
                ready_tx,
            ))),
        };

        (
            Self {
                epoch,
                params,
                transport,
            },
            ready_rx,
        )
    }

    pub(crate) fn params(&self) -> &SessionParams {
        &self.params
    }

    pub(crate) fn kind(&self) -> TransportKind {
        match self.transport {
            Transport::Push(_) => TransportKind::Push,
            Transport::Pull(_) => TransportKind::Pull,
        }
    }

    fn handle(&self) -> &JoinHandle<()> {
        match &self.transport {
            Transport::Push(handle) | Transport::Pull(handle) => handle,
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        tracing::debug!(epoch = self.epoch, transport = ?self.kind(), "stopping stream session");
        self.handle().abort();
    }
}
