use reqwest::header;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

pub const DEFAULT_API_BASE: &str = "https://api.chzzk.naver.com";

/// Browser-like user agent; the lookup endpoints reject bare clients.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Ordered extraction rules for the room id. The live-detail response has
/// carried the field at different depths across API revisions; the first
/// non-empty hit wins.
const ROOM_ID_RULES: &[&[&str]] = &[
    &["content", "chatChannelId"],
    &["content", "live", "chatChannelId"],
];

/// Resolves a human-supplied channel identifier to the chat-room identifier
/// the socket protocol uses.
pub struct ChannelResolver {
    http: reqwest::Client,
    api_base: String,
}

impl ChannelResolver {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }

    /// Resolve `channel_id` to a room id.
    ///
    /// The channel-info lookup reports broadcast status, which is logged but
    /// never blocks resolution; an offline channel is still attempted. If
    /// none of the live-detail endpoints yields a room id, the channel id
    /// itself is used (the platform accepts this in practice), so failure is
    /// only possible at the transport level.
    pub async fn resolve(&self, channel_id: &str) -> AppResult<String> {
        self.check_channel(channel_id).await?;

        for endpoint in self.live_detail_endpoints(channel_id) {
            match self.fetch_json(&endpoint).await {
                Ok(body) => {
                    if let Some(room_id) = extract_room_id(&body) {
                        info!(%room_id, "resolved chat room id");
                        return Ok(room_id);
                    }
                    debug!(%endpoint, "no room id in response, trying next endpoint");
                }
                Err(err) => {
                    debug!(%endpoint, %err, "lookup failed, trying next endpoint");
                }
            }
        }

        info!(%channel_id, "falling back to channel id as room id");
        Ok(channel_id.to_string())
    }

    async fn check_channel(&self, channel_id: &str) -> AppResult<()> {
        let url = format!("{}/service/v1/channels/{channel_id}", self.api_base);
        let body = self.fetch_json(&url).await?;

        let content = body.get("content").cloned().unwrap_or(Value::Null);
        let channel_name = content
            .get("channelName")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let open_live = content
            .get("openLive")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        info!(%channel_name, open_live, "channel lookup");
        if !open_live {
            warn!("channel appears offline; attempting chat connection anyway");
        }
        Ok(())
    }

    fn live_detail_endpoints(&self, channel_id: &str) -> Vec<String> {
        vec![
            format!(
                "{}/service/v2/channels/{channel_id}/live-detail",
                self.api_base
            ),
            format!(
                "{}/service/v1/channels/{channel_id}/live-detail",
                self.api_base
            ),
            format!(
                "{}/service/v1/channels/{channel_id}/live-status",
                self.api_base
            ),
        ]
    }

    async fn fetch_json(&self, url: &str) -> AppResult<Value> {
        let response = self
            .http
            .get(url)
            .header(header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("GET {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Transport(format!(
                "GET {url}: status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Transport(format!("GET {url}: invalid body: {e}")))
    }
}

/// Apply the extraction rules in priority order.
fn extract_room_id(body: &Value) -> Option<String> {
    for path in ROOM_ID_RULES {
        let mut current = body;
        let mut found = true;
        for key in *path {
            match current.get(key) {
                Some(next) => current = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Some(id) = current.as_str() {
                if !id.is_empty() {
                    return Some(id.to_string());
                }
            }
        }
    }
    None
}
