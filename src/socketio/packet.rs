//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Every websocket text frame is an Engine.IO packet: a single type digit
//! followed by its data. Engine.IO `message` packets carry a Socket.IO packet:
//!
//! ```text
//! <type>[/<namespace>,][<ack id>][<json>]
//! ```

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "/";

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown engine.io packet type '{0}'")]
    UnknownEngineType(char),

    #[error("unknown socket.io packet type '{0}'")]
    UnknownPacketType(char),

    #[error("binary socket.io packets are not supported")]
    Binary,

    #[error("invalid ack id '{0}'")]
    InvalidAckId(String),

    #[error("invalid packet payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Handshake data sent by the server in the Engine.IO `open` packet.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(frame: &str) -> Result<Self, PacketError> {
        let kind = frame.chars().next().ok_or(PacketError::Empty)?;
        let data = &frame[kind.len_utf8()..];
        match kind {
            '0' => Ok(EnginePacket::Open(serde_json::from_str(data)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(data.to_string())),
            '3' => Ok(EnginePacket::Pong(data.to_string())),
            '4' => Ok(EnginePacket::Message(data.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(PacketError::UnknownEngineType(other)),
        }
    }

    /// Encode a client-side packet. `Open` is server-only and encodes as a bare type.
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(_) => "0".to_string(),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{}", data),
            EnginePacket::Pong(data) => format!("3{}", data),
            EnginePacket::Message(data) => format!("4{}", data),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
}

impl PacketKind {
    fn digit(self) -> char {
        match self {
            PacketKind::Connect => '0',
            PacketKind::Disconnect => '1',
            PacketKind::Event => '2',
            PacketKind::Ack => '3',
            PacketKind::ConnectError => '4',
        }
    }

    fn from_digit(c: char) -> Result<Self, PacketError> {
        match c {
            '0' => Ok(PacketKind::Connect),
            '1' => Ok(PacketKind::Disconnect),
            '2' => Ok(PacketKind::Event),
            '3' => Ok(PacketKind::Ack),
            '4' => Ok(PacketKind::ConnectError),
            '5' | '6' => Err(PacketError::Binary),
            other => Err(PacketError::UnknownPacketType(other)),
        }
    }
}

/// A Socket.IO packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub kind: PacketKind,
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Option<Value>,
}

impl Packet {
    pub fn connect(namespace: &str) -> Self {
        Self::new(PacketKind::Connect, namespace, None, None)
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self::new(PacketKind::Disconnect, namespace, None, None)
    }

    pub fn event(namespace: &str, name: &str, args: Vec<Value>) -> Self {
        let mut items = Vec::with_capacity(args.len() + 1);
        items.push(Value::String(name.to_string()));
        items.extend(args);
        Self::new(PacketKind::Event, namespace, None, Some(Value::Array(items)))
    }

    pub fn ack(namespace: &str, id: u64, args: Vec<Value>) -> Self {
        Self::new(PacketKind::Ack, namespace, Some(id), Some(Value::Array(args)))
    }

    fn new(kind: PacketKind, namespace: &str, id: Option<u64>, data: Option<Value>) -> Self {
        Self {
            kind,
            namespace: namespace.to_string(),
            id,
            data,
        }
    }

    pub fn decode(payload: &str) -> Result<Self, PacketError> {
        let kind_char = payload.chars().next().ok_or(PacketError::Empty)?;
        let kind = PacketKind::from_digit(kind_char)?;
        let mut rest = &payload[kind_char.len_utf8()..];

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(comma) => {
                    let ns = &rest[..comma];
                    rest = &rest[comma + 1..];
                    ns.to_string()
                }
                None => {
                    let ns = rest.to_string();
                    rest = "";
                    ns
                }
            }
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        let id = if digits > 0 {
            let raw = &rest[..digits];
            rest = &rest[digits..];
            Some(
                raw.parse::<u64>()
                    .map_err(|_| PacketError::InvalidAckId(raw.to_string()))?,
            )
        } else {
            None
        };

        let data = if rest.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest)?)
        };

        Ok(Self {
            kind,
            namespace,
            id,
            data,
        })
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.digit());
        if self.namespace != DEFAULT_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// Wrap the encoded packet in an Engine.IO message frame.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }

    /// Split an EVENT payload into its name and arguments.
    pub fn event_parts(&self) -> Option<(String, Vec<Value>)> {
        if self.kind != PacketKind::Event {
            return None;
        }
        let mut items = match &self.data {
            Some(Value::Array(items)) if !items.is_empty() => items.clone(),
            _ => return None,
        };
        let name = match items.remove(0) {
            Value::String(name) => name,
            _ => return None,
        };
        Some((name, items))
    }

    /// Message carried by a CONNECT_ERROR packet.
    pub fn error_message(&self) -> String {
        match &self.data {
            Some(Value::Object(map)) => map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("connection refused")
                .to_string(),
            Some(Value::String(message)) => message.clone(),
            _ => "connection refused".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open_handshake() {
        let frame = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        match EnginePacket::decode(frame).unwrap() {
            EnginePacket::Open(hs) => {
                assert_eq!(hs.sid, "lv_VI97HAXpY6yYWAAAC");
                assert_eq!(hs.ping_interval, 25000);
                assert_eq!(hs.ping_timeout, 20000);
                assert_eq!(hs.max_payload, Some(1000000));
            }
            other => panic!("unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_engine_ping_answered_with_same_data() {
        let ping = EnginePacket::decode("2probe").unwrap();
        assert_eq!(ping, EnginePacket::Ping("probe".to_string()));
        assert_eq!(EnginePacket::Pong("probe".to_string()).encode(), "3probe");
        assert!(matches!(
            EnginePacket::decode("9"),
            Err(PacketError::UnknownEngineType('9'))
        ));
        assert!(matches!(EnginePacket::decode(""), Err(PacketError::Empty)));
    }

    #[test]
    fn test_decode_event_with_namespace_and_ack() {
        let packet = Packet::decode(r#"2/testipytests,12["rm_params",{"debug":"True"}]"#).unwrap();
        assert_eq!(packet.kind, PacketKind::Event);
        assert_eq!(packet.namespace, "/testipytests");
        assert_eq!(packet.id, Some(12));

        let (name, args) = packet.event_parts().unwrap();
        assert_eq!(name, "rm_params");
        assert_eq!(args, vec![json!({"debug": "True"})]);
    }

    #[test]
    fn test_decode_default_namespace_event() {
        let packet = Packet::decode(r#"2["show_status","running"]"#).unwrap();
        assert_eq!(packet.namespace, DEFAULT_NAMESPACE);
        assert_eq!(packet.id, None);
        let (name, args) = packet.event_parts().unwrap();
        assert_eq!(name, "show_status");
        assert_eq!(args, vec![json!("running")]);
    }

    #[test]
    fn test_decode_connect_variants() {
        let ack = Packet::decode(r#"0/testipytests,{"sid":"abc"}"#).unwrap();
        assert_eq!(ack.kind, PacketKind::Connect);
        assert_eq!(ack.namespace, "/testipytests");

        let bare = Packet::decode("1/testipytests").unwrap();
        assert_eq!(bare.kind, PacketKind::Disconnect);
        assert_eq!(bare.namespace, "/testipytests");
        assert_eq!(bare.data, None);

        let refused = Packet::decode(r#"4/admin,{"message":"Not authorized"}"#).unwrap();
        assert_eq!(refused.kind, PacketKind::ConnectError);
        assert_eq!(refused.error_message(), "Not authorized");
    }

    #[test]
    fn test_binary_packets_rejected() {
        assert!(matches!(
            Packet::decode(r#"51-["upload",{"_placeholder":true,"num":0}]"#),
            Err(PacketError::Binary)
        ));
    }

    #[test]
    fn test_encode_client_packets() {
        assert_eq!(Packet::connect("/").encode(), "0");
        assert_eq!(Packet::connect("/testipytests").to_frame(), "40/testipytests,");
        assert_eq!(
            Packet::event("/testipytests", "my_ping", vec![]).to_frame(),
            r#"42/testipytests,["my_ping"]"#
        );
        assert_eq!(
            Packet::ack("/testipytests", 3, vec![json!("yes")]).to_frame(),
            r#"43/testipytests,3["yes"]"#
        );
        assert_eq!(Packet::disconnect("/").to_frame(), "41");
    }

    #[test]
    fn test_event_parts_rejects_non_events() {
        let packet = Packet::ack("/", 1, vec![]);
        assert!(packet.event_parts().is_none());

        let nameless = Packet::decode("2[42]").unwrap();
        assert!(nameless.event_parts().is_none());
    }
}
