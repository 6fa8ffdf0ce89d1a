pub mod consumer;
pub mod push;
pub mod service;
pub mod store;

pub use consumer::{handle_push, PushConsumer, NOTIFICATION_EVENT};
pub use push::PushEvent;
pub use service::{NotificationSource, NotificationSynchronizer, PushOutcome, SyncError};
pub use store::NotificationStore;
