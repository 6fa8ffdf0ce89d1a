use crate::config::Config;
use crate::guard::RouteGuard;
use crate::storage::{FileStorage, SharedStorage, StorageError};
use crate::token_store::TokenStore;
use std::sync::Arc;

/// Explicit session object handed to every component that needs the current
/// user. Replaces process-wide user state.
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<Config>,
    pub tokens: TokenStore,
    pub guard: Arc<RouteGuard>,
}

impl SessionContext {
    pub fn new(config: Config) -> Result<Self, StorageError> {
        let storage: SharedStorage = Arc::new(FileStorage::open(&config.storage.path)?);
        Ok(Self::with_storage(config, storage))
    }

    pub fn with_storage(config: Config, storage: SharedStorage) -> Self {
        let tokens = TokenStore::new(storage);
        SessionContext {
            config: Arc::new(config),
            guard: Arc::new(RouteGuard::new(tokens.clone())),
            tokens,
        }
    }

    pub fn user_id(&self) -> Result<Option<String>, StorageError> {
        self.tokens.user_id()
    }
}
