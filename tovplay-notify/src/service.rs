use crate::push::PushEvent;
use crate::store::NotificationStore;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tovplay_api::{ApiClient, ApiError};
use tovplay_core::Notification;
use tracing;

pub const FETCH_FAILED: &str = "Failed to fetch notifications";

/// REST side of the synchronizer.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Notification>, ApiError>;
    async fn mark_read(&self, ids: &[String]) -> Result<(), ApiError>;
}

#[async_trait]
impl NotificationSource for ApiClient {
    async fn fetch(&self) -> Result<Vec<Notification>, ApiError> {
        self.get_notifications().await
    }

    async fn mark_read(&self, ids: &[String]) -> Result<(), ApiError> {
        ApiClient::mark_read(self, ids).await
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to fetch notifications: {0}")]
    Fetch(#[source] ApiError),
    #[error("failed to mark notifications as read: {0}")]
    MarkRead(#[source] ApiError),
    #[error("notification synchronizer has shut down")]
    ShutDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Appended(String),
    Refetched,
}

/// Sole writer of the notification store.
///
/// No request is cancelled on shutdown; completions that land afterwards are
/// discarded. A fast-path append can still be overwritten by an older fetch
/// that resolves later; the next fetch repairs it.
pub struct NotificationSynchronizer<S> {
    source: Arc<S>,
    store: Arc<RwLock<NotificationStore>>,
    alive: Arc<AtomicBool>,
}

impl<S> Clone for NotificationSynchronizer<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            store: self.store.clone(),
            alive: self.alive.clone(),
        }
    }
}

impl<S: NotificationSource> NotificationSynchronizer<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            store: Arc::new(RwLock::new(NotificationStore::new())),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub async fn snapshot(&self) -> NotificationStore {
        self.store.read().await.clone()
    }

    pub async fn unread_count(&self) -> usize {
        self.store.read().await.unread_count()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::Release);
    }

    fn ensure_alive(&self) -> Result<(), SyncError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(SyncError::ShutDown)
        }
    }

    /// Replaces the store with the server's current set.
    pub async fn fetch_notifications(&self) -> Result<(), SyncError> {
        self.ensure_alive()?;
        self.store.write().await.begin_loading();

        let result = self.source.fetch().await;
        if !self.is_alive() {
            tracing::debug!("Discarding notification fetch after shutdown");
            return Err(SyncError::ShutDown);
        }

        let mut store = self.store.write().await;
        match result {
            Ok(notifications) => {
                store.replace_all(notifications);
                tracing::debug!(
                    "Fetched {} notifications ({} unread)",
                    store.notifications().len(),
                    store.unread_count()
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("{}: {}", FETCH_FAILED, e);
                store.fail(FETCH_FAILED);
                Err(SyncError::Fetch(e))
            }
        }
    }

    pub async fn handle_notification(&self, event: Value) -> Result<PushOutcome, SyncError> {
        self.ensure_alive()?;

        match PushEvent::classify(event) {
            PushEvent::SessionCancelled(notification) => {
                let id = notification.id.clone();
                self.store.write().await.prepend(notification);
                tracing::info!("Session cancellation received: {}", id);
                Ok(PushOutcome::Appended(id))
            }
            PushEvent::Unrecognized(_) => {
                tracing::debug!("Unrecognized push, refetching notifications");
                self.fetch_notifications().await?;
                Ok(PushOutcome::Refetched)
            }
        }
    }

    /// Flips read flags only after the server confirms. Returns how many
    /// records changed.
    pub async fn mark_as_read(&self, ids: &[String]) -> Result<usize, SyncError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.ensure_alive()?;

        if let Err(e) = self.source.mark_read(ids).await {
            tracing::error!("Error marking notifications as read: {}", e);
            return Err(SyncError::MarkRead(e));
        }
        if !self.is_alive() {
            tracing::debug!("Discarding mark-read confirmation after shutdown");
            return Err(SyncError::ShutDown);
        }

        let flipped = self.store.write().await.mark_read(ids);
        tracing::debug!("Marked {} of {} notifications read", flipped, ids.len());
        Ok(flipped)
    }

    /// Marks everything currently listed, then resyncs.
    pub async fn mark_all_as_read(&self) -> Result<(), SyncError> {
        let ids = self.store.read().await.ids();
        if ids.is_empty() {
            return Ok(());
        }
        self.mark_as_read(&ids).await?;
        self.fetch_notifications().await
    }

    /// Bell-item click: mark the one record read, then resync.
    pub async fn open_notification(&self, id: &str) -> Result<(), SyncError> {
        self.mark_as_read(&[id.to_string()]).await?;
        self.fetch_notifications().await
    }
}
