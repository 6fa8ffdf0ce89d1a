//! Engine.IO v4 / Socket.IO v5 text framing for the default namespace.
//!
//! A WebSocket text frame carries one Engine.IO packet: a single type digit
//! followed by its payload. Engine.IO `message` packets in turn carry one
//! Socket.IO packet: type digit, optional `/namespace,`, optional ack id,
//! then a JSON body.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,
    #[error("unknown packet type {0:?}")]
    UnknownType(char),
    #[error("binary packets are not supported")]
    Binary,
    #[error("malformed packet body: {0}")]
    Body(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

impl OpenHandshake {
    /// How long the server may stay silent before the connection counts as
    /// lost. `None` when the server advertised no heartbeat.
    pub fn silence_window(&self) -> Option<Duration> {
        (self.ping_interval > 0)
            .then(|| Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, PacketError> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let body = chars.as_str();

        Ok(match kind {
            '0' => EnginePacket::Open(
                serde_json::from_str(body).map_err(|e| PacketError::Body(e.to_string()))?,
            ),
            '1' => EnginePacket::Close,
            '2' => EnginePacket::Ping(body.to_string()),
            '3' => EnginePacket::Pong(body.to_string()),
            '4' => EnginePacket::Message(body.to_string()),
            '5' => EnginePacket::Upgrade,
            '6' => EnginePacket::Noop,
            other => return Err(PacketError::UnknownType(other)),
        })
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(open) => format!(
                "0{}",
                serde_json::json!({
                    "sid": open.sid,
                    "pingInterval": open.ping_interval,
                    "pingTimeout": open.ping_timeout,
                })
            ),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, args: Vec<Value> },
    Ack { id: u64, args: Vec<Value> },
    ConnectError(Value),
}

/// Socket.IO packet plus the namespace it was addressed to.
#[derive(Debug, Clone, PartialEq)]
pub struct Addressed {
    pub namespace: String,
    pub packet: SocketPacket,
}

impl SocketPacket {
    pub fn event(name: &str, payload: Option<Value>) -> Self {
        SocketPacket::Event {
            name: name.to_string(),
            args: payload.into_iter().collect(),
        }
    }

    pub fn decode(body: &str) -> Result<Addressed, PacketError> {
        let mut chars = body.chars();
        let kind = chars.next().ok_or(PacketError::Empty)?;
        let mut rest = chars.as_str();

        let mut namespace = "/".to_string();
        if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            namespace = rest[..end].to_string();
            rest = rest.get(end + 1..).unwrap_or("");
        }

        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let ack_id = rest[..digits].parse::<u64>().ok();
        let json = &rest[digits..];

        let packet = match kind {
            '0' => SocketPacket::Connect(parse_optional(json)?),
            '1' => SocketPacket::Disconnect,
            '2' => {
                let mut args = parse_array(json)?;
                if args.is_empty() {
                    return Err(PacketError::Body("event without a name".to_string()));
                }
                let name = match args.remove(0) {
                    Value::String(name) => name,
                    other => return Err(PacketError::Body(format!("event name {}", other))),
                };
                SocketPacket::Event { name, args }
            }
            '3' => SocketPacket::Ack {
                id: ack_id.ok_or_else(|| PacketError::Body("ack without an id".to_string()))?,
                args: parse_array(json)?,
            },
            '4' => SocketPacket::ConnectError(parse_optional(json)?.unwrap_or(Value::Null)),
            '5' | '6' => return Err(PacketError::Binary),
            other => return Err(PacketError::UnknownType(other)),
        };

        Ok(Addressed { namespace, packet })
    }

    /// Encodes for the default namespace, wrapped in an Engine.IO message.
    pub fn encode(&self) -> String {
        let body = match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(auth)) => format!("0{}", auth),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!("2{}", Value::Array(items))
            }
            SocketPacket::Ack { id, args } => format!("3{}{}", id, Value::Array(args.clone())),
            SocketPacket::ConnectError(data) => format!("4{}", data),
        };
        EnginePacket::Message(body).encode()
    }
}

fn parse_optional(json: &str) -> Result<Option<Value>, PacketError> {
    if json.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(json)
        .map(Some)
        .map_err(|e| PacketError::Body(e.to_string()))
}

fn parse_array(json: &str) -> Result<Vec<Value>, PacketError> {
    match serde_json::from_str(json) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(other) => Err(PacketError::Body(format!("expected array, got {}", other))),
        Err(e) => Err(PacketError::Body(e.to_string())),
    }
}

/// `http(s)://host` → `ws(s)://host/socket.io/?EIO=4&transport=websocket`.
pub fn endpoint_url(base: &str) -> String {
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };

    if base.contains("/socket.io") {
        return base;
    }
    format!(
        "{}/socket.io/?EIO=4&transport=websocket",
        base.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_open_handshake() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        assert_eq!(
            packet,
            EnginePacket::Open(OpenHandshake {
                sid: "abc".to_string(),
                ping_interval: 25000,
                ping_timeout: 20000,
            })
        );
    }

    #[test]
    fn silence_window_covers_interval_and_timeout() {
        let open = OpenHandshake {
            sid: "abc".to_string(),
            ping_interval: 25000,
            ping_timeout: 20000,
        };
        assert_eq!(open.silence_window(), Some(Duration::from_secs(45)));

        let quiet = OpenHandshake {
            sid: "abc".to_string(),
            ping_interval: 0,
            ping_timeout: 0,
        };
        assert_eq!(quiet.silence_window(), None);
    }

    #[test]
    fn engine_control_packets() {
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
        assert_eq!(EnginePacket::decode("1").unwrap(), EnginePacket::Close);
        assert_eq!(EnginePacket::decode(""), Err(PacketError::Empty));
        assert_eq!(EnginePacket::decode("9"), Err(PacketError::UnknownType('9')));
    }

    #[test]
    fn decodes_notification_event() {
        let addressed =
            SocketPacket::decode(r#"2["notification",{"type":"session_cancelled","message":"x"}]"#)
                .unwrap();
        assert_eq!(addressed.namespace, "/");
        assert_eq!(
            addressed.packet,
            SocketPacket::Event {
                name: "notification".to_string(),
                args: vec![json!({"type": "session_cancelled", "message": "x"})],
            }
        );
    }

    #[test]
    fn decodes_namespace_and_ack_id() {
        let addressed = SocketPacket::decode(r#"2/admin,13["ping"]"#).unwrap();
        assert_eq!(addressed.namespace, "/admin");
        assert!(matches!(addressed.packet, SocketPacket::Event { ref name, .. } if name == "ping"));

        let ack = SocketPacket::decode("37[true]").unwrap();
        assert_eq!(
            ack.packet,
            SocketPacket::Ack {
                id: 7,
                args: vec![json!(true)]
            }
        );
    }

    #[test]
    fn connect_ack_with_and_without_body() {
        assert_eq!(
            SocketPacket::decode(r#"0{"sid":"s1"}"#).unwrap().packet,
            SocketPacket::Connect(Some(json!({"sid": "s1"})))
        );
        assert_eq!(SocketPacket::decode("0").unwrap().packet, SocketPacket::Connect(None));
        assert_eq!(SocketPacket::decode("1").unwrap().packet, SocketPacket::Disconnect);
    }

    #[test]
    fn encodes_outbound_events() {
        assert_eq!(SocketPacket::Connect(None).encode(), "40");
        assert_eq!(
            SocketPacket::event("register", Some(json!({"userId": "u1"}))).encode(),
            r#"42["register",{"userId":"u1"}]"#
        );
        assert_eq!(SocketPacket::event("user_online", None).encode(), r#"42["user_online"]"#);
    }

    #[test]
    fn rejects_binary_and_nameless_events() {
        assert_eq!(SocketPacket::decode(r#"51-["x",{}]"#), Err(PacketError::Binary));
        assert!(matches!(SocketPacket::decode("2[]"), Err(PacketError::Body(_))));
        assert!(matches!(SocketPacket::decode("2[5]"), Err(PacketError::Body(_))));
    }

    #[test]
    fn endpoint_maps_scheme_and_path() {
        assert_eq!(
            endpoint_url("http://localhost:5001"),
            "ws://localhost:5001/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            endpoint_url("https://app.example.com/"),
            "wss://app.example.com/socket.io/?EIO=4&transport=websocket"
        );
        assert_eq!(
            endpoint_url("ws://h/socket.io/?EIO=4&transport=websocket"),
            "ws://h/socket.io/?EIO=4&transport=websocket"
        );
    }
}
