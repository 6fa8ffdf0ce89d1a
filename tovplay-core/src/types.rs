use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub message: String,
    #[serde(default, deserialize_with = "de_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    /// `null` reads as unread.
    #[serde(default, deserialize_with = "de_null_default")]
    pub is_read: bool,
    #[serde(default, alias = "user_id", deserialize_with = "de_opt_id")]
    pub recipient_user_id: Option<String>,
}

impl Notification {
    pub fn parsed_message(&self) -> NotificationMessage {
        NotificationMessage::parse(&self.message)
    }

    /// Declined game requests are shown but not clickable.
    pub fn is_declined(&self) -> bool {
        match self.parsed_message() {
            NotificationMessage::Structured(payload) => payload.is_declined(),
            NotificationMessage::Plain(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationMessage {
    Plain(String),
    Structured(MessagePayload),
}

impl NotificationMessage {
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => match serde_json::from_value(value) {
                Ok(payload) => NotificationMessage::Structured(payload),
                Err(_) => NotificationMessage::Plain(raw.to_string()),
            },
            _ => NotificationMessage::Plain(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    /// Outcome of a game request: "accepted", "declined", ...
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl MessagePayload {
    pub fn outcome(&self) -> Option<&str> {
        self.payload.as_ref().and_then(Value::as_str)
    }

    pub fn is_declined(&self) -> bool {
        self.outcome() == Some("declined")
    }

    pub fn is_session_cancelled(&self) -> bool {
        self.kind.as_deref() == Some("session_cancelled")
    }

    /// Human-readable line for a game-request response. `resolved_name` is a
    /// profile lookup of `user_id` and wins over the embedded `user_name`.
    pub fn summary(&self, resolved_name: Option<&str>) -> String {
        let name = resolved_name
            .or(self.user_name.as_deref())
            .unwrap_or("Someone");

        if self.outcome() == Some("accepted") {
            format!("{} accepted your game request!", name)
        } else {
            format!(
                "{} declined your game request because {}",
                name,
                self.reason.as_deref().unwrap_or("they couldn't make it")
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_discord_registered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSession {
    pub token: String,
    pub user_id: String,
    pub is_discord_registered: bool,
}

/// Accepts RFC 3339 or a naive ISO-8601 timestamp, the latter read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn id_from_value(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn de_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    id_from_value(value).ok_or_else(|| serde::de::Error::custom("id must be a string or number"))
}

fn de_opt_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(id_from_value))
}

fn de_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn de_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => parse_timestamp(&s),
        _ => None,
    })
}
