use reqwest::header;
use serde_json::Value;
use tracing::{info, warn};

use crate::services::resolver::BROWSER_USER_AGENT;

pub const DEFAULT_TOKEN_BASE: &str = "https://comm-api.game.naver.com";

/// Exchanges a resolved room id for a short-lived chat access credential.
///
/// Issuance is best-effort: the platform accepts anonymous read-only joins
/// for some rooms, so a failed exchange downgrades the session instead of
/// failing it.
pub struct TokenIssuer {
    http: reqwest::Client,
    token_base: String,
}

impl TokenIssuer {
    pub fn new(token_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_base: token_base.into(),
        }
    }

    pub async fn issue(&self, room_id: &str) -> Option<String> {
        let url = format!(
            "{}/nng_main/v1/chats/access-token?channelId={room_id}&chatType=STREAMING",
            self.token_base
        );

        let response = match self
            .http
            .get(&url)
            .header(header::USER_AGENT, BROWSER_USER_AGENT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                warn!(status = %resp.status(), "access token lookup rejected; joining anonymously");
                return None;
            }
            Err(err) => {
                warn!(%err, "access token lookup failed; joining anonymously");
                return None;
            }
        };

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                warn!(%err, "access token response unreadable; joining anonymously");
                return None;
            }
        };

        match body
            .get("content")
            .and_then(|c| c.get("accessToken"))
            .and_then(Value::as_str)
        {
            Some(token) if !token.is_empty() => {
                info!("chat access token issued");
                Some(token.to_string())
            }
            _ => {
                warn!("access token missing from response; joining anonymously");
                None
            }
        }
    }
}
