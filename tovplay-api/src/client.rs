use crate::error::ApiError;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tovplay_core::config::ApiConfig;
use tovplay_core::{LoginSession, MessagePayload, Notification, TokenStore, UserProfile};
use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The server rejected the stored token; it has already been cleared.
    Expired,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    #[serde(rename = "Email")]
    email: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    jwt_token: Option<String>,
    #[serde(default)]
    user_id: Option<Value>,
}

/// REST client for the TovPlay backend. Every path is relative to
/// `<base_url>/api`.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
    session_events: broadcast::Sender<SessionEvent>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, tokens: TokenStore) -> Result<Self, ApiError> {
        tracing::info!("Initializing API client for {}", config.base_url);

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        let (session_events, _) = broadcast::channel(8);

        Ok(Self {
            http,
            base_url: format!("{}/api", config.base_url.trim_end_matches('/')),
            tokens,
            session_events,
        })
    }

    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_events.subscribe()
    }

    pub async fn get_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        self.request_json(self.request(Method::GET, "/notifications/")?)
            .await
    }

    pub async fn mark_read(&self, ids: &[String]) -> Result<(), ApiError> {
        let request = self.request(Method::POST, "/notifications/mark_read")?.json(ids);
        self.execute(request).await?;
        Ok(())
    }

    /// `None` when the user has no profile (404).
    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, ApiError> {
        let request = self.request(Method::GET, &format!("/users/{}", user_id))?;
        let value: Value = match self.request_json(request).await {
            Ok(v) => v,
            Err(ApiError::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        // Some deployments answer with a one-element array
        let profile = match value {
            Value::Array(items) => match items.into_iter().next() {
                Some(first) => first,
                None => return Ok(None),
            },
            Value::Null => return Ok(None),
            other => other,
        };

        Ok(Some(serde_json::from_value(profile)?))
    }

    /// Password login. Stores the session on success and clears it on any
    /// failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginSession, ApiError> {
        match self.try_login(email, password).await {
            Ok(session) => {
                self.tokens.login(&session)?;
                Ok(session)
            }
            Err(e) => {
                tracing::warn!("Login failed: {}", e);
                self.tokens.logout()?;
                Err(e)
            }
        }
    }

    async fn try_login(&self, email: &str, password: &str) -> Result<LoginSession, ApiError> {
        let request = self
            .http
            .post(self.url("/users/login"))
            .header(ACCEPT, "application/json")
            .json(&LoginRequest { email, password });

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "Login failed.".to_string());
            return Err(ApiError::Login(message));
        }

        let login: LoginResponse = serde_json::from_str(&body)?;
        let (token, user_id) = match (login.jwt_token, login.user_id) {
            (Some(token), Some(Value::String(id))) => (token, id),
            (Some(token), Some(Value::Number(id))) => (token, id.to_string()),
            _ => return Err(ApiError::Login("Didn't receive token.".to_string())),
        };

        // Profile lookup needs the fresh token
        self.tokens.set(&token)?;
        let is_discord_registered = self
            .get_user(&user_id)
            .await?
            .map(|p| p.is_discord_registered)
            .unwrap_or(false);

        Ok(LoginSession {
            token,
            user_id,
            is_discord_registered,
        })
    }

    /// Display text for a notification. Structured game-request messages are
    /// rendered with the sender's profile name when it can be resolved.
    pub async fn describe(&self, payload: &MessagePayload) -> String {
        let mut resolved = None;
        if let Some(user_id) = &payload.user_id {
            match self.get_user(user_id).await {
                Ok(profile) => resolved = profile.and_then(|p| p.name),
                Err(e) => tracing::error!("Failed to resolve user {}: {}", user_id, e),
            }
        }
        payload.summary(resolved.as_deref())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let mut request = self
            .http
            .request(method, self.url(path))
            .header(ACCEPT, "application/json");

        match self.tokens.get()? {
            Some(token) => request = request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => tracing::warn!("No auth token stored for {}", path),
        }

        Ok(request)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!("API request failed: {}", e);
            ApiError::Network(e)
        })?;

        let status = response.status();
        let body = response.text().await?;
        tracing::debug!("API response status: {}", status);

        if status == StatusCode::UNAUTHORIZED {
            self.expire_session();
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            tracing::error!("API error {}: {}", status, body);
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    async fn request_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let body = self.execute(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    fn expire_session(&self) {
        tracing::warn!("Server rejected auth token, clearing session");
        if let Err(e) = self.tokens.clear() {
            tracing::error!("Failed to clear auth token: {}", e);
        }
        // No subscribers is fine
        let _ = self.session_events.send(SessionEvent::Expired);
    }
}
