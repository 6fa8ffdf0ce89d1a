use crate::storage::{SharedStorage, StorageError};
use crate::types::LoginSession;
use tracing;

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const AUTH_USER_ID_KEY: &str = "authUserId";
pub const AUTH_IS_LOGGED_IN_KEY: &str = "authisLoggedIn";
pub const IS_DISCORD_REGISTERED_KEY: &str = "isDiscordRegistered";

/// One persisted key.
#[derive(Clone)]
pub struct StorageItem {
    key: &'static str,
    storage: SharedStorage,
}

impl StorageItem {
    pub fn new(key: &'static str, storage: SharedStorage) -> Self {
        Self { key, storage }
    }

    pub fn get(&self) -> Result<Option<String>, StorageError> {
        self.storage.get(self.key)
    }

    pub fn set(&self, value: &str) -> Result<(), StorageError> {
        self.storage.set(self.key, value)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.remove(self.key)
    }

    pub fn get_flag(&self) -> Result<bool, StorageError> {
        Ok(matches!(self.get()?.as_deref(), Some("true")))
    }

    pub fn set_flag(&self, value: bool) -> Result<(), StorageError> {
        self.set(if value { "true" } else { "false" })
    }
}

/// Persisted authentication session. Validity is never cached here; callers
/// re-derive it from the token on every access.
#[derive(Clone)]
pub struct TokenStore {
    pub auth_token: StorageItem,
    pub auth_user_id: StorageItem,
    pub auth_is_logged_in: StorageItem,
    pub is_discord_registered: StorageItem,
}

impl TokenStore {
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            auth_token: StorageItem::new(AUTH_TOKEN_KEY, storage.clone()),
            auth_user_id: StorageItem::new(AUTH_USER_ID_KEY, storage.clone()),
            auth_is_logged_in: StorageItem::new(AUTH_IS_LOGGED_IN_KEY, storage.clone()),
            is_discord_registered: StorageItem::new(IS_DISCORD_REGISTERED_KEY, storage),
        }
    }

    pub fn get(&self) -> Result<Option<String>, StorageError> {
        self.auth_token.get()
    }

    pub fn set(&self, token: &str) -> Result<(), StorageError> {
        self.auth_token.set(token)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.auth_token.clear()
    }

    pub fn user_id(&self) -> Result<Option<String>, StorageError> {
        self.auth_user_id.get()
    }

    pub fn login(&self, session: &LoginSession) -> Result<(), StorageError> {
        self.auth_token.set(&session.token)?;
        self.auth_user_id.set(&session.user_id)?;
        self.auth_is_logged_in.set_flag(true)?;
        self.is_discord_registered.set_flag(session.is_discord_registered)?;

        tracing::info!("Session stored for user: {}", session.user_id);
        Ok(())
    }

    pub fn logout(&self) -> Result<(), StorageError> {
        self.auth_token.clear()?;
        self.auth_user_id.clear()?;
        self.auth_is_logged_in.clear()?;
        self.is_discord_registered.clear()?;

        tracing::info!("Session cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Storage};
    use std::sync::Arc;

    fn session() -> LoginSession {
        LoginSession {
            token: "tok".to_string(),
            user_id: "user-1".to_string(),
            is_discord_registered: true,
        }
    }

    #[test]
    fn login_persists_all_items_under_client_keys() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(storage.clone());

        store.login(&session()).unwrap();

        assert_eq!(storage.get("authToken").unwrap().as_deref(), Some("tok"));
        assert_eq!(storage.get("authUserId").unwrap().as_deref(), Some("user-1"));
        assert_eq!(storage.get("authisLoggedIn").unwrap().as_deref(), Some("true"));
        assert_eq!(storage.get("isDiscordRegistered").unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn clear_removes_only_the_token() {
        let store = TokenStore::new(Arc::new(MemoryStorage::new()));
        store.login(&session()).unwrap();

        store.clear().unwrap();

        assert_eq!(store.get().unwrap(), None);
        assert_eq!(store.user_id().unwrap().as_deref(), Some("user-1"));
    }

    #[test]
    fn logout_clears_everything() {
        let store = TokenStore::new(Arc::new(MemoryStorage::new()));
        store.login(&session()).unwrap();

        store.logout().unwrap();

        assert_eq!(store.get().unwrap(), None);
        assert_eq!(store.user_id().unwrap(), None);
        assert!(!store.auth_is_logged_in.get_flag().unwrap());
        assert!(!store.is_discord_registered.get_flag().unwrap());
    }
}
