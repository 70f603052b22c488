use std::collections::{HashSet, VecDeque};

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::models::{ChatMessage, MessageKind, Role};
use crate::protocol::CMD_DONATION;

const STREAMER_ROLE_CODE: &str = "streamer";

/// Decodes raw payload frames into canonical messages.
///
/// One frame may carry a single message object or a batch; every element is
/// normalized independently. Anything undecodable is dropped with a debug
/// log; a malformed message must never interrupt the stream. The normalizer
/// also owns the recent-id window that backs deduplication, sized at least
/// as large as the message buffer so a duplicate cannot slip back in while
/// its original is still visible.
pub struct MessageNormalizer {
    seen: RecentIds,
}

impl MessageNormalizer {
    pub fn new(dedup_window: usize) -> Self {
        Self {
            seen: RecentIds::new(dedup_window),
        }
    }

    /// Normalize every message carried by one payload frame.
    pub fn normalize(&mut self, cmd: i64, bdy: &Value) -> Vec<ChatMessage> {
        match bdy {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| self.normalize_one(cmd, item))
                .collect(),
            Value::Object(_) => self.normalize_one(cmd, bdy).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn normalize_one(&mut self, cmd: i64, item: &Value) -> Option<ChatMessage> {
        let text = item.get("msg").and_then(Value::as_str).unwrap_or("").trim();
        if text.is_empty() {
            debug!("dropping message with empty text");
            return None;
        }

        let id = derive_id(item);
        if id.is_empty() {
            debug!("dropping message with no usable id");
            return None;
        }
        if !self.seen.insert(&id) {
            debug!(%id, "dropping duplicate message");
            return None;
        }

        let sender_id = item
            .get("uid")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let profile = parse_profile(item.get("profile"));

        let role_code = profile
            .get("userRoleCode")
            .and_then(Value::as_str)
            .unwrap_or("");
        let role = if role_code == STREAMER_ROLE_CODE {
            Role::Streamer
        } else {
            Role::Viewer
        };

        let amount = item.get("payAmount").and_then(Value::as_u64).unwrap_or(0);
        let kind = if cmd == CMD_DONATION || amount > 0 {
            MessageKind::Donation
        } else {
            MessageKind::Chat
        };

        Some(ChatMessage {
            id,
            occurred_at: Utc::now(),
            sender_id,
            nickname: profile
                .get("nickname")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            text: text.to_string(),
            role,
            kind,
            amount: if kind == MessageKind::Donation {
                amount
            } else {
                0
            },
            badge_url: nested_str(&profile, &["badge", "imageUrl"]),
            title_name: nested_str(&profile, &["title", "name"]),
            title_color: nested_str(&profile, &["title", "color"]),
            avatar_url: profile
                .get("profileImageUrl")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        })
    }
}

/// Best available id source: explicit message id, else a sender + server
/// timestamp composite.
fn derive_id(item: &Value) -> String {
    for key in ["msgId", "id"] {
        if let Some(id) = item.get(key).and_then(Value::as_str) {
            if !id.is_empty() {
                return id.to_string();
            }
        }
    }

    let uid = item.get("uid").and_then(Value::as_str).unwrap_or("");
    let msg_time = item
        .get("msgTime")
        .map(|v| v.to_string())
        .unwrap_or_default();
    if uid.is_empty() && msg_time.is_empty() {
        String::new()
    } else {
        format!("{uid}{msg_time}")
    }
}

/// The profile arrives either as a JSON-encoded string or as a plain object.
fn parse_profile(raw: Option<&Value>) -> Value {
    match raw {
        Some(Value::String(encoded)) => {
            serde_json::from_str(encoded).unwrap_or(Value::Object(Default::default()))
        }
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => Value::Object(Default::default()),
    }
}

fn nested_str(value: &Value, path: &[&str]) -> String {
    let mut current = value;
    for key in path {
        match current.get(key) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    current.as_str().unwrap_or("").to_string()
}

/// Bounded FIFO window of recently-seen message ids.
struct RecentIds {
    order: VecDeque<String>,
    set: HashSet<String>,
    capacity: usize,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Returns false when the id was already in the window.
    fn insert(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        self.order.push_back(id.to_string());
        self.set.insert(id.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chat_frame_body() -> Value {
        json!([{
            "msgId": "m1",
            "msg": "hi",
            "uid": "u1",
            "profile": "{\"nickname\":\"A\",\"userRoleCode\":\"streamer\"}",
        }])
    }

    #[test]
    fn normalizes_a_streamer_message() {
        let mut normalizer = MessageNormalizer::new(16);
        let messages = normalizer.normalize(93101, &chat_frame_body());

        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.nickname, "A");
        assert_eq!(msg.role, Role::Streamer);
        assert_eq!(msg.kind, MessageKind::Chat);
        assert_eq!(msg.amount, 0);
    }

    #[test]
    fn replaying_the_same_frame_yields_nothing() {
        let mut normalizer = MessageNormalizer::new(16);
        assert_eq!(normalizer.normalize(93101, &chat_frame_body()).len(), 1);
        assert_eq!(normalizer.normalize(93101, &chat_frame_body()).len(), 0);
    }

    #[test]
    fn drops_empty_text_and_missing_id() {
        let mut normalizer = MessageNormalizer::new(16);

        let empty_text = json!([{"msgId": "m2", "msg": "   ", "uid": "u1"}]);
        assert!(normalizer.normalize(93101, &empty_text).is_empty());

        let no_id = json!([{"msg": "hello"}]);
        assert!(normalizer.normalize(93101, &no_id).is_empty());
    }

    #[test]
    fn falls_back_to_sender_and_timestamp_for_id() {
        let mut normalizer = MessageNormalizer::new(16);
        let body = json!([{"msg": "hello", "uid": "u9", "msgTime": 1700000000123u64}]);

        let messages = normalizer.normalize(93101, &body);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "u91700000000123");
    }

    #[test]
    fn classifies_donations_by_command_and_amount() {
        let mut normalizer = MessageNormalizer::new(16);

        let by_cmd = json!([{"msgId": "d1", "msg": "thanks!", "uid": "u1", "profile": {}}]);
        let messages = normalizer.normalize(CMD_DONATION, &by_cmd);
        assert_eq!(messages[0].kind, MessageKind::Donation);

        let by_amount =
            json!([{"msgId": "d2", "msg": "here", "uid": "u2", "payAmount": 5000, "profile": {}}]);
        let messages = normalizer.normalize(93101, &by_amount);
        assert_eq!(messages[0].kind, MessageKind::Donation);
        assert_eq!(messages[0].amount, 5000);
    }

    #[test]
    fn accepts_profile_as_object_or_encoded_string() {
        let mut normalizer = MessageNormalizer::new(16);
        let body = json!([{
            "msgId": "m5",
            "msg": "yo",
            "uid": "u5",
            "profile": {
                "nickname": "B",
                "userRoleCode": "common_user",
                "badge": {"imageUrl": "https://cdn/badge.png"},
                "title": {"name": "fan", "color": "#FFAA00"},
                "profileImageUrl": "https://cdn/avatar.png",
            },
        }]);

        let messages = normalizer.normalize(93101, &body);
        let msg = &messages[0];
        assert_eq!(msg.role, Role::Viewer);
        assert_eq!(msg.badge_url, "https://cdn/badge.png");
        assert_eq!(msg.title_name, "fan");
        assert_eq!(msg.title_color, "#FFAA00");
        assert_eq!(msg.avatar_url, "https://cdn/avatar.png");
    }

    #[test]
    fn malformed_profile_does_not_drop_the_message() {
        let mut normalizer = MessageNormalizer::new(16);
        let body = json!([{"msgId": "m6", "msg": "ok", "uid": "u6", "profile": "{not json"}]);

        let messages = normalizer.normalize(93101, &body);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].nickname, "");
        assert_eq!(messages[0].role, Role::Viewer);
    }

    #[test]
    fn handles_batched_payloads() {
        let mut normalizer = MessageNormalizer::new(16);
        let body = json!([
            {"msgId": "b1", "msg": "one", "uid": "u1"},
            {"msgId": "b2", "msg": "two", "uid": "u2"},
            {"msgId": "b1", "msg": "one again", "uid": "u1"},
        ]);

        let messages = normalizer.normalize(93101, &body);
        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2"]);
    }

    #[test]
    fn dedup_window_evicts_oldest_ids() {
        let mut normalizer = MessageNormalizer::new(2);
        for id in ["a", "b", "c"] {
            let body = json!([{"msgId": id, "msg": "x", "uid": "u"}]);
            assert_eq!(normalizer.normalize(93101, &body).len(), 1);
        }

        // "a" has been evicted from the window, so it may reappear.
        let body = json!([{"msgId": "a", "msg": "x", "uid": "u"}]);
        assert_eq!(normalizer.normalize(93101, &body).len(), 1);
    }
}
