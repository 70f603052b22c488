//! Wire protocol for the CHZZK chat socket.
//!
//! Every unit exchanged over the connection is one JSON frame. The commands
//! the connector cares about:
//!
//! - join (client -> server): `{"ver":"2","cmd":100,...}` with the room id
//!   and an optional access token; read-only auth.
//! - heartbeat probe (server -> client): `{"ver":"2","cmd":0}`, answered
//!   with `{"ver":"2","cmd":10000}`. The same probe shape doubles as the
//!   client-initiated keep-alive.
//! - join result (server -> client): `{"cmd":10000,"retCode":...,"retMsg":...}`,
//!   `retCode == 200` meaning success.
//! - message payload (server -> client): `{"cmd":...,"bdy":...}` where `bdy`
//!   is one message object or a batch of them.

use serde_json::{json, Value};

pub const VERSION: &str = "2";
pub const CMD_HEARTBEAT: i64 = 0;
pub const CMD_JOIN: i64 = 100;
pub const CMD_HEARTBEAT_ACK: i64 = 10000;
pub const CMD_DONATION: i64 = 93102;
pub const JOIN_OK: i64 = 200;

const SERVICE_ID: &str = "game";
const DEVICE_TYPE: i64 = 2001;
const AUTH_READ: &str = "READ";

/// What an inbound frame asks of the connector.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    /// Server probe; must be answered immediately with the ack frame.
    HeartbeatProbe,
    /// Result of the join handshake; observed, never gates a transition.
    JoinResult { ret_code: i64, ret_msg: String },
    /// One or more chat messages to normalize.
    Payload { cmd: i64 },
    /// Anything else is ignored.
    Other,
}

pub fn classify(frame: &Value) -> FrameKind {
    let cmd = frame.get("cmd").and_then(Value::as_i64);
    let ver = frame.get("ver").and_then(Value::as_str);

    if cmd == Some(CMD_HEARTBEAT) && ver == Some(VERSION) {
        return FrameKind::HeartbeatProbe;
    }

    if cmd == Some(CMD_HEARTBEAT_ACK) {
        return FrameKind::JoinResult {
            ret_code: frame.get("retCode").and_then(Value::as_i64).unwrap_or(-1),
            ret_msg: frame
                .get("retMsg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };
    }

    if frame.get("bdy").is_some() {
        return FrameKind::Payload {
            cmd: cmd.unwrap_or(0),
        };
    }

    FrameKind::Other
}

pub fn join_frame(room_id: &str, credential: Option<&str>) -> String {
    json!({
        "ver": VERSION,
        "cmd": CMD_JOIN,
        "svcid": SERVICE_ID,
        "cid": room_id,
        "bdy": {
            "uid": Value::Null,
            "devType": DEVICE_TYPE,
            "accTkn": credential,
            "auth": AUTH_READ,
        },
        "tid": 1,
    })
    .to_string()
}

/// Client keep-alive, sent on the heartbeat interval.
pub fn keepalive_frame() -> String {
    json!({ "ver": VERSION, "cmd": CMD_HEARTBEAT }).to_string()
}

/// Answer to a server heartbeat probe.
pub fn heartbeat_ack_frame() -> String {
    json!({ "ver": VERSION, "cmd": CMD_HEARTBEAT_ACK }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_heartbeat_probe() {
        let frame = serde_json::json!({"ver": "2", "cmd": 0});
        assert_eq!(classify(&frame), FrameKind::HeartbeatProbe);
    }

    #[test]
    fn classifies_join_result() {
        let frame = serde_json::json!({"cmd": 10000, "retCode": 200, "retMsg": "ok"});
        assert_eq!(
            classify(&frame),
            FrameKind::JoinResult {
                ret_code: 200,
                ret_msg: "ok".to_string()
            }
        );
    }

    #[test]
    fn classifies_payload_frames() {
        let frame = serde_json::json!({"cmd": 93101, "bdy": [{"msg": "hi"}]});
        assert_eq!(classify(&frame), FrameKind::Payload { cmd: 93101 });
    }

    #[test]
    fn unknown_frames_are_ignored() {
        assert_eq!(classify(&serde_json::json!({"cmd": 42})), FrameKind::Other);
        assert_eq!(classify(&serde_json::json!({})), FrameKind::Other);
    }

    #[test]
    fn join_frame_carries_room_and_credential() {
        let frame: serde_json::Value =
            serde_json::from_str(&join_frame("room-1", Some("tkn"))).unwrap();
        assert_eq!(frame["cmd"], CMD_JOIN);
        assert_eq!(frame["svcid"], "game");
        assert_eq!(frame["cid"], "room-1");
        assert_eq!(frame["bdy"]["accTkn"], "tkn");
        assert_eq!(frame["bdy"]["auth"], "READ");
        assert!(frame["bdy"]["uid"].is_null());
    }

    #[test]
    fn join_frame_allows_anonymous_reads() {
        let frame: serde_json::Value = serde_json::from_str(&join_frame("room-1", None)).unwrap();
        assert!(frame["bdy"]["accTkn"].is_null());
    }

    #[test]
    fn heartbeat_frames_round_trip() {
        let probe: serde_json::Value = serde_json::from_str(&keepalive_frame()).unwrap();
        assert_eq!(classify(&probe), FrameKind::HeartbeatProbe);

        let ack: serde_json::Value = serde_json::from_str(&heartbeat_ack_frame()).unwrap();
        assert_eq!(ack["cmd"], CMD_HEARTBEAT_ACK);
    }
}
