//! Event delivery - forwards node events to the caller's listener on a
//! background task, in arrival order.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::models::BreezEvent;
use crate::node_api::NodeEvent;

/// Implemented by the caller to react to [`BreezEvent`]s. Invoked from the
/// session's delivery task, never from the thread that called `connect`.
pub trait EventListener: Send + Sync {
    fn on_event(&self, e: BreezEvent);
}

impl From<NodeEvent> for BreezEvent {
    fn from(event: NodeEvent) -> Self {
        match event {
            NodeEvent::Block { height } => BreezEvent::NewBlock { block: height },
            NodeEvent::InvoicePaid(details) => BreezEvent::InvoicePaid { details },
            NodeEvent::PaymentSucceeded(details) => BreezEvent::PaymentSucceed { details },
            NodeEvent::PaymentFailed(details) => BreezEvent::PaymentFailed { details },
        }
    }
}

/// How a delivery task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeliveryEnd {
    /// The session asked it to stop.
    Shutdown,
    /// The backend stream closed; `Disconnected` was delivered.
    StreamClosed,
}

/// Spawn the delivery task for one session.
///
/// `node_events` comes from the backend, `local_events` from the session itself
/// (e.g. `Synced`). The task exits on shutdown, or after delivering
/// `Disconnected` when the backend stream closes.
pub(crate) fn spawn_delivery(
    listener: Arc<dyn EventListener>,
    mut node_events: mpsc::UnboundedReceiver<NodeEvent>,
    mut local_events: mpsc::UnboundedReceiver<BreezEvent>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<DeliveryEnd> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::debug!("Event delivery stopped");
                    return DeliveryEnd::Shutdown;
                }
                event = node_events.recv() => match event {
                    Some(event) => listener.on_event(event.into()),
                    None => {
                        tracing::warn!("Node event stream closed");
                        listener.on_event(BreezEvent::Disconnected {
                            reason: "node event stream closed".into(),
                        });
                        return DeliveryEnd::StreamClosed;
                    }
                },
                Some(event) = local_events.recv() => listener.on_event(event),
            }
        }
    })
}
