pub mod config;
pub mod context;
pub mod guard;
pub mod jwt;
pub mod storage;
pub mod token_store;
pub mod types;

pub use config::Config;
pub use context::SessionContext;
pub use guard::{AccessState, Boundary, RouteDecision, RouteGuard};
pub use jwt::{Claims, TokenError};
pub use storage::{FileStorage, MemoryStorage, SharedStorage, Storage, StorageError};
pub use token_store::{StorageItem, TokenStore};
pub use types::{LoginSession, MessagePayload, Notification, NotificationMessage, UserProfile};

/// Seconds since the epoch, the unit of the `exp` claim.
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
