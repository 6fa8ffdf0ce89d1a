use anyhow::Result;
use std::sync::Arc;
use tokio::time::{interval_at, Instant, Interval};
use tovplay_api::{ApiClient, SessionEvent};
use tovplay_core::{
    jwt, now_unix, Config, LoginSession, Notification, NotificationMessage, RouteDecision,
    RouteGuard, SessionContext,
};
use tovplay_notify::{handle_push, NotificationSynchronizer, PushConsumer};
use tovplay_realtime::{BannerChange, ChannelOptions, DisconnectBanner, RealtimeChannel};
use tracing;
use tracing_subscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting TovPlay session client");

    // Load configuration
    let config = Config::from_env();
    let session = SessionContext::new(config)?;
    let api = Arc::new(ApiClient::new(&session.config.api, session.tokens.clone())?);

    bootstrap_login(&session, &api).await?;

    if session.guard.protected(now_unix())? != RouteDecision::Allow {
        tracing::warn!(
            "No valid session. Set TOVPLAY_EMAIL and TOVPLAY_PASSWORD, or TOVPLAY_TOKEN and TOVPLAY_USER_ID"
        );
        return Ok(());
    }

    let sync = NotificationSynchronizer::new(api.clone());
    open_bell(&sync, &api).await;

    let channel = RealtimeChannel::connect(ChannelOptions::from_session(&session)?);
    let mut pushes = PushConsumer::attach(&channel);
    let mut state = channel.watch_state();
    let mut banner = DisconnectBanner::new();
    let mut session_events = api.subscribe_session();
    let mut poll = session
        .config
        .sync
        .poll_interval()
        .map(|period| interval_at(Instant::now() + period, period));

    tracing::info!("Session client running");

    loop {
        tokio::select! {
            Some(event) = pushes.next() => {
                handle_push(&sync, event).await;
                log_counts(&sync).await;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                match banner.observe(current) {
                    BannerChange::Shown => tracing::warn!(
                        "Connection to the notification server was lost. Live updates are paused until it reconnects."
                    ),
                    BannerChange::Cleared => tracing::info!("Reconnected to the notification server"),
                    BannerChange::Unchanged => {}
                }
            }
            _ = tick(&mut poll) => {
                // Each poll is a navigation to a protected view
                if !poll_allowed(&session.guard, now_unix()) {
                    break;
                }
                open_bell(&sync, &api).await;
            }
            Ok(SessionEvent::Expired) = session_events.recv() => {
                tracing::warn!("Server rejected the session, please sign in again");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    sync.shutdown();
    pushes.detach(&channel);
    channel.shutdown().await;

    Ok(())
}

/// Seeds the token store from configuration when it does not already hold a
/// usable token.
async fn bootstrap_login(session: &SessionContext, api: &ApiClient) -> Result<()> {
    let login = &session.config.login;

    if let (Some(token), Some(user_id)) = (&login.token, &login.user_id) {
        // OAuth redirect hands over a token for a Discord-linked account
        session.tokens.login(&LoginSession {
            token: token.clone(),
            user_id: user_id.clone(),
            is_discord_registered: true,
        })?;
        return Ok(());
    }

    let stored = session.tokens.get()?;
    if jwt::is_valid(stored.as_deref(), now_unix()) {
        tracing::info!("Reusing stored session");
        return Ok(());
    }

    if let (Some(email), Some(password)) = (&login.email, &login.password) {
        let started = api.login(email, password).await?;
        tracing::info!("Signed in as user: {}", started.user_id);
    }

    Ok(())
}

/// Guard check before a poll. Storage failures end the loop like an expired
/// session so the channel still shuts down cleanly.
fn poll_allowed(guard: &RouteGuard, now: i64) -> bool {
    match guard.protected(now) {
        Ok(RouteDecision::Allow) => true,
        Ok(RouteDecision::Redirect(_)) => {
            tracing::warn!("Session expired, please sign in again");
            false
        }
        Err(e) => {
            tracing::error!("Failed to read session state: {}", e);
            false
        }
    }
}

/// Bell click: resync, then show what is listed.
async fn open_bell(sync: &NotificationSynchronizer<ApiClient>, api: &ApiClient) {
    if let Err(e) = sync.fetch_notifications().await {
        tracing::error!("Notification refresh failed: {}", e);
        return;
    }

    let store = sync.snapshot().await;
    for notification in store.notifications() {
        let line = render(api, notification).await;
        tracing::debug!(id = %notification.id, read = notification.is_read, "{}", line);
    }
    log_counts(sync).await;
}

async fn render(api: &ApiClient, notification: &Notification) -> String {
    match notification.parsed_message() {
        NotificationMessage::Plain(text) => text,
        NotificationMessage::Structured(payload) => {
            let mut line = api.describe(&payload).await;
            if payload.is_session_cancelled() {
                if let Some(reason) = &payload.reason {
                    line = format!("{} (cancellation reason: {})", line, reason);
                }
            }
            line
        }
    }
}

async fn log_counts(sync: &NotificationSynchronizer<ApiClient>) {
    let store = sync.snapshot().await;
    tracing::info!(
        "{} notifications, {} unread",
        store.notifications().len(),
        store.unread_count()
    );
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tovplay_core::{MemoryStorage, Storage, StorageError, TokenStore};

    struct BrokenStorage;

    impl Storage for BrokenStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Poisoned)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Poisoned)
        }
    }

    #[test]
    fn storage_failure_stops_polling_without_error() {
        let guard = RouteGuard::new(TokenStore::new(Arc::new(BrokenStorage)));
        assert!(!poll_allowed(&guard, now_unix()));
    }

    #[test]
    fn missing_token_stops_polling() {
        let guard = RouteGuard::new(TokenStore::new(Arc::new(MemoryStorage::new())));
        assert!(!poll_allowed(&guard, now_unix()));
    }
}
