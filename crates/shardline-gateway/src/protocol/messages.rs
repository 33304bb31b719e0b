//! Gateway frame envelope `{op, d, s, t}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{HelloPayload, IdentifyPayload, OpCode, PresenceUpdatePayload, ResumePayload};

/// One JSON frame, in either direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub op: OpCode,

    /// Payload; `null` and absent both decode to `None`
    #[serde(default)]
    pub d: Option<Value>,

    /// Sequence number (dispatch only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name (dispatch only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayMessage {
    fn new(op: OpCode, d: Option<Value>) -> Self {
        Self {
            op,
            d,
            s: None,
            t: None,
        }
    }

    // === Outgoing ===

    /// Heartbeat carrying the last seen sequence (`null` before the first dispatch)
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, last_sequence.map(Value::from))
    }

    pub fn identify(payload: &IdentifyPayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(OpCode::Identify, Some(serde_json::to_value(payload)?)))
    }

    pub fn resume(payload: &ResumePayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(OpCode::Resume, Some(serde_json::to_value(payload)?)))
    }

    pub fn presence_update(payload: &PresenceUpdatePayload) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            OpCode::PresenceUpdate,
            Some(serde_json::to_value(payload)?),
        ))
    }

    // === Incoming ===

    /// Heartbeat interval of a Hello frame
    pub fn as_hello(&self) -> Option<HelloPayload> {
        if self.op != OpCode::Hello {
            return None;
        }
        self.d
            .as_ref()
            .and_then(|d| HelloPayload::deserialize(d).ok())
    }

    /// Whether an Invalid Session frame allows resuming (`d` is a bool,
    /// anything else counts as `false`)
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.d.as_ref().and_then(Value::as_bool).unwrap_or(false))
    }

    /// Event name and sequence of a dispatch frame
    pub fn as_dispatch(&self) -> Option<(&str, Option<u64>)> {
        if self.op != OpCode::Dispatch {
            return None;
        }
        self.t.as_deref().map(|name| (name, self.s))
    }

    // === Utilities ===

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_heartbeat_always_carries_d() {
        assert_eq!(
            GatewayMessage::heartbeat(None).to_json().unwrap(),
            r#"{"op":1,"d":null}"#
        );
        assert_eq!(
            GatewayMessage::heartbeat(Some(42)).to_json().unwrap(),
            r#"{"op":1,"d":42}"#
        );
    }

    #[test]
    fn test_parse_dispatch() {
        let msg = GatewayMessage::from_json(
            r#"{"op":0,"t":"MESSAGE_CREATE","s":7,"d":{"id":"1"}}"#,
        )
        .unwrap();

        assert_eq!(msg.as_dispatch(), Some(("MESSAGE_CREATE", Some(7))));
        assert_eq!(msg.d, Some(json!({"id": "1"})));
        assert!(msg.as_hello().is_none());
    }

    #[test]
    fn test_parse_hello() {
        let msg = GatewayMessage::from_json(r#"{"op":10,"d":{"heartbeat_interval":41250},"s":null,"t":null}"#)
            .unwrap();
        assert_eq!(msg.as_hello().unwrap().heartbeat_interval, 41_250);
        assert_eq!(msg.s, None);
    }

    #[test]
    fn test_parse_invalid_session() {
        let resumable = GatewayMessage::from_json(r#"{"op":7,"d":true}"#).unwrap();
        assert_eq!(resumable.as_invalid_session(), Some(true));

        let fresh = GatewayMessage::from_json(r#"{"op":7,"d":null}"#).unwrap();
        assert_eq!(fresh.as_invalid_session(), Some(false));
    }

    #[test]
    fn test_resume_frame() {
        let msg = GatewayMessage::resume(&ResumePayload {
            token: "t".to_string(),
            session_id: "abc".to_string(),
            seq: 99,
        })
        .unwrap();
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"op": 4, "d": {"token": "t", "session_id": "abc", "seq": 99}}));
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(GatewayMessage::from_json("not json").is_err());
        assert!(GatewayMessage::from_json(r#"{"op":6,"d":null}"#).is_err());
        assert!(GatewayMessage::from_json(r#"{"d":null}"#).is_err());
    }

    #[test]
    fn test_message_display() {
        let msg = GatewayMessage::from_json(r#"{"op":0,"t":"READY","s":1,"d":{}}"#).unwrap();
        let display = msg.to_string();
        assert!(display.contains("READY"));
        assert!(display.contains("s=1"));
    }
}
