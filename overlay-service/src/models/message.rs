use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical chat message, immutable once constructed.
///
/// `id` is the deduplication key: the protocol-provided message id when one
/// exists, else a sender-id + server-timestamp composite. `occurred_at` is
/// wall-clock capture time, not protocol time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    pub sender_id: String,
    pub nickname: String,
    pub text: String,
    pub role: Role,
    pub kind: MessageKind,
    /// Donation amount; zero unless `kind` is `Donation`.
    pub amount: u64,
    pub badge_url: String,
    pub title_name: String,
    pub title_color: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Streamer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Chat,
    Donation,
}
