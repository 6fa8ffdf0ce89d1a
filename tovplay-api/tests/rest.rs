use serde_json::json;
use std::sync::Arc;
use tovplay_api::{ApiClient, ApiError, SessionEvent};
use tovplay_core::config::ApiConfig;
use tovplay_core::{MemoryStorage, MessagePayload, TokenStore};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> (ApiClient, TokenStore) {
    let tokens = TokenStore::new(Arc::new(MemoryStorage::new()));
    let config = ApiConfig {
        base_url: server.uri(),
        timeout_secs: 5,
    };
    (ApiClient::new(&config, tokens.clone()).unwrap(), tokens)
}

#[tokio::test]
async fn fetches_notifications_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/notifications/"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "message": "hello", "created_at": "2025-01-01T00:00:00", "is_read": false},
            {"id": "2", "message": "bye", "is_read": true}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let (client, tokens) = client_for(&server);
    tokens.set("tok-1").unwrap();

    let notifications = client.get_notifications().await.unwrap();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].id, "1");
    assert!(notifications[1].is_read);
}

#[tokio::test]
async fn mark_read_posts_identifier_array() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/notifications/mark_read"))
        .and(body_json(json!(["1", "3"])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, tokens) = client_for(&server);
    tokens.set("tok").unwrap();

    client
        .mark_read(&["1".to_string(), "3".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn unauthorized_clears_token_and_signals_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/notifications/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (client, tokens) = client_for(&server);
    tokens.set("stale").unwrap();
    tokens.auth_user_id.set("u1").unwrap();
    let mut events = client.subscribe_session();

    let err = client.get_notifications().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));
    assert_eq!(tokens.get().unwrap(), None);
    assert_eq!(tokens.user_id().unwrap().as_deref(), Some("u1"));
    assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired);
}

#[tokio::test]
async fn server_errors_carry_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/notifications/mark_read"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let (client, _) = client_for(&server);
    let err = client.mark_read(&["1".to_string()]).await.unwrap_err();
    match err {
        ApiError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_profile_is_none_and_arrays_take_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 7, "name": "Dana", "is_discord_registered": true}
        ])))
        .mount(&server)
        .await;

    let (client, _) = client_for(&server);
    assert!(client.get_user("404").await.unwrap().is_none());

    let profile = client.get_user("7").await.unwrap().unwrap();
    assert_eq!(profile.name.as_deref(), Some("Dana"));
    assert!(profile.is_discord_registered);
}

#[tokio::test]
async fn login_stores_full_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users/login"))
        .and(body_json(json!({"Email": "a@b.c", "Password": "pw"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"jwt_token": "fresh", "user_id": 12})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/12"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"name": "Lee", "is_discord_registered": true})),
        )
        .mount(&server)
        .await;

    let (client, tokens) = client_for(&server);
    let session = client.login("a@b.c", "pw").await.unwrap();

    assert_eq!(session.user_id, "12");
    assert_eq!(tokens.get().unwrap().as_deref(), Some("fresh"));
    assert_eq!(tokens.user_id().unwrap().as_deref(), Some("12"));
    assert!(tokens.auth_is_logged_in.get_flag().unwrap());
    assert!(tokens.is_discord_registered.get_flag().unwrap());
}

#[tokio::test]
async fn failed_login_reports_server_message_and_clears_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users/login"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Invalid credentials"})),
        )
        .mount(&server)
        .await;

    let (client, tokens) = client_for(&server);
    tokens.set("old").unwrap();

    let err = client.login("a@b.c", "bad").await.unwrap_err();
    assert!(matches!(err, ApiError::Login(ref m) if m == "Invalid credentials"));
    assert_eq!(tokens.get().unwrap(), None);
}

#[tokio::test]
async fn login_without_token_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user_id": "1"})))
        .mount(&server)
        .await;

    let (client, _) = client_for(&server);
    let err = client.login("a@b.c", "pw").await.unwrap_err();
    assert!(matches!(err, ApiError::Login(ref m) if m == "Didn't receive token."));
}

#[tokio::test]
async fn describe_resolves_sender_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Maya"})))
        .mount(&server)
        .await;

    let (client, _) = client_for(&server);
    let payload = MessagePayload {
        user_id: Some("5".to_string()),
        user_name: Some("fallback".to_string()),
        payload: Some(json!("accepted")),
        ..Default::default()
    };
    assert_eq!(client.describe(&payload).await, "Maya accepted your game request!");
}
