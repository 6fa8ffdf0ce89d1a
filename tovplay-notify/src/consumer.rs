use crate::service::{NotificationSource, NotificationSynchronizer, PushOutcome, SyncError};
use serde_json::Value;
use tokio::sync::mpsc;
use tovplay_realtime::{HandlerId, RealtimeChannel};
use tracing;

pub const NOTIFICATION_EVENT: &str = "notification";

/// Bridges synchronous channel callbacks into an async queue so pushes are
/// applied one at a time, in arrival order.
pub struct PushConsumer {
    rx: mpsc::UnboundedReceiver<Value>,
    handler: HandlerId,
}

impl PushConsumer {
    pub fn attach(channel: &RealtimeChannel) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = channel.on(NOTIFICATION_EVENT, move |payload| {
            let _ = tx.send(payload.clone());
        });
        tracing::info!("Subscribed to realtime {} events", NOTIFICATION_EVENT);
        Self { rx, handler }
    }

    pub async fn next(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    pub fn detach(self, channel: &RealtimeChannel) {
        channel.off(NOTIFICATION_EVENT, self.handler);
    }
}

/// Applies one push. Errors are logged here and never escape into the event
/// loop.
pub async fn handle_push<S: NotificationSource>(sync: &NotificationSynchronizer<S>, event: Value) {
    match sync.handle_notification(event).await {
        Ok(PushOutcome::Appended(id)) => tracing::debug!("Push appended as {}", id),
        Ok(PushOutcome::Refetched) => tracing::debug!("Push resolved by refetch"),
        Err(SyncError::ShutDown) => tracing::debug!("Push ignored after shutdown"),
        Err(e) => tracing::error!("Error processing notification push: {}", e),
    }
}
