use chrono::Utc;
use serde_json::Value;
use tovplay_core::types::parse_timestamp;
use tovplay_core::Notification;

/// Realtime pushes the client knows how to apply locally. Anything else is
/// resolved by refetching from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    SessionCancelled(Notification),
    Unrecognized(Value),
}

impl PushEvent {
    pub fn classify(event: Value) -> Self {
        let cancelled = event.get("type").and_then(Value::as_str) == Some("session_cancelled");
        let message = event
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        match (cancelled, message) {
            (true, Some(message)) => PushEvent::SessionCancelled(Notification {
                id: push_id(&event),
                message,
                created_at: event
                    .get("created_at")
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp)
                    .or_else(|| Some(Utc::now())),
                is_read: false,
                recipient_user_id: event
                    .get("recipient_user_id")
                    .and_then(id_string),
            }),
            _ => PushEvent::Unrecognized(event),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::SessionCancelled(_) => "session_cancelled",
            PushEvent::Unrecognized(_) => "unrecognized",
        }
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn push_id(event: &Value) -> String {
    event
        .get("id")
        .and_then(id_string)
        .unwrap_or_else(|| format!("local-{}", uuid::Uuid::new_v4()))
}
