use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use resilience::{with_retry, RetryConfig};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::MusicSettings;
use crate::models::{NowPlaying, NowPlayingState};
use crate::services::supervisor::LifecycleHandle;
use crate::services::SessionEnd;

struct IssuedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Polls the music service for the currently-playing track and publishes the
/// shared snapshot. The simpler sibling of the chat connector: the only
/// retry concern here is the expiry-driven token refresh, and a failed cycle
/// just leaves the previous snapshot standing until the next tick.
pub struct NowPlayingPoller {
    http: reqwest::Client,
    settings: MusicSettings,
    state: NowPlayingState,
    stop_rx: watch::Receiver<bool>,
    lifecycle: LifecycleHandle,
    token: Option<IssuedToken>,
}

impl NowPlayingPoller {
    pub fn new(
        settings: MusicSettings,
        state: NowPlayingState,
        stop_rx: watch::Receiver<bool>,
        lifecycle: LifecycleHandle,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
            state,
            stop_rx,
            lifecycle,
            token: None,
        }
    }

    pub async fn run(mut self) -> SessionEnd {
        info!("now-playing poller starting");
        self.lifecycle.set_running();

        let mut stop_rx = self.stop_rx.clone();
        if *stop_rx.borrow() {
            return SessionEnd::Stopped;
        }

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        info!("now-playing poller stopped");
                        return SessionEnd::Stopped;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.poll_once().await {
                        warn!(%err, "now-playing poll cycle failed");
                    }
                }
            }
        }
    }

    async fn poll_once(&mut self) -> Result<(), String> {
        if !self.token_valid() {
            let token = self.refresh_token().await?;
            self.token = Some(token);
        }
        let access_token = match &self.token {
            Some(token) => token.access_token.clone(),
            None => return Err("no access token".to_string()),
        };
        self.fetch_now_playing(&access_token).await
    }

    fn token_valid(&self) -> bool {
        self.token
            .as_ref()
            .is_some_and(|token| Utc::now() < token.expires_at)
    }

    async fn refresh_token(&self) -> Result<IssuedToken, String> {
        let retry = RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        };
        let token = with_retry(retry, || self.request_token())
            .await
            .map_err(|err| err.to_string())?;
        info!("music access token refreshed");
        Ok(token)
    }

    async fn request_token(&self) -> Result<IssuedToken, String> {
        let client_id = self.settings.client_id.as_deref().unwrap_or_default();
        let client_secret = self.settings.client_secret.as_deref().unwrap_or_default();
        let refresh_token = self.settings.refresh_token.as_deref().unwrap_or_default();
        let basic = STANDARD.encode(format!("{client_id}:{client_secret}"));

        let response = self
            .http
            .post(&self.settings.token_url)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {basic}"))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("token endpoint status {}", response.status()));
        }

        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "access_token missing from response".to_string())?
            .to_string();
        let expires_in = body.get("expires_in").and_then(Value::as_i64).unwrap_or(3600);

        Ok(IssuedToken {
            access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        })
    }

    async fn fetch_now_playing(&self, access_token: &str) -> Result<(), String> {
        let url = format!("{}/me/player/currently-playing", self.settings.api_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        match response.status().as_u16() {
            200 => {
                let body: Value = response.json().await.map_err(|e| e.to_string())?;
                if let Some(now_playing) = parse_track(&body) {
                    debug!(track = %now_playing.track_name, "now-playing updated");
                    self.state.update(now_playing).await;
                }
                Ok(())
            }
            // Nothing playing.
            204 => {
                self.state.update(NowPlaying::idle()).await;
                Ok(())
            }
            status => Err(format!("currently-playing status {status}")),
        }
    }
}

fn parse_track(body: &Value) -> Option<NowPlaying> {
    let item = body.get("item")?;

    let artist_name = item
        .get("artists")
        .and_then(Value::as_array)
        .map(|artists| {
            artists
                .iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    Some(NowPlaying {
        is_playing: body
            .get("is_playing")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        track_name: str_at(item, &["name"]),
        artist_name,
        album_name: str_at(item, &["album", "name"]),
        album_image: item
            .get("album")
            .and_then(|album| album.get("images"))
            .and_then(Value::as_array)
            .and_then(|images| images.first())
            .map(|image| str_at(image, &["url"]))
            .unwrap_or_default(),
        progress_ms: body.get("progress_ms").and_then(Value::as_u64).unwrap_or(0),
        duration_ms: item
            .get("duration_ms")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        external_url: str_at(item, &["external_urls", "spotify"]),
    })
}

fn str_at(value: &Value, path: &[&str]) -> String {
    let mut current = value;
    for key in path {
        match current.get(key) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    current.as_str().unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_playing_track() {
        let body = json!({
            "is_playing": true,
            "progress_ms": 12345,
            "item": {
                "name": "Song",
                "duration_ms": 200000,
                "artists": [{"name": "A"}, {"name": "B"}],
                "album": {
                    "name": "Album",
                    "images": [{"url": "https://cdn/cover.jpg"}],
                },
                "external_urls": {"spotify": "https://open.spotify.com/track/x"},
            },
        });

        let now_playing = parse_track(&body).expect("track");
        assert!(now_playing.is_playing);
        assert_eq!(now_playing.track_name, "Song");
        assert_eq!(now_playing.artist_name, "A, B");
        assert_eq!(now_playing.album_name, "Album");
        assert_eq!(now_playing.album_image, "https://cdn/cover.jpg");
        assert_eq!(now_playing.progress_ms, 12345);
        assert_eq!(now_playing.duration_ms, 200000);
        assert_eq!(
            now_playing.external_url,
            "https://open.spotify.com/track/x"
        );
    }

    #[test]
    fn missing_item_yields_none() {
        assert!(parse_track(&json!({"is_playing": false})).is_none());
    }

    #[test]
    fn tolerates_sparse_track_metadata() {
        let body = json!({"item": {"name": "Bare"}});
        let now_playing = parse_track(&body).expect("track");
        assert_eq!(now_playing.track_name, "Bare");
        assert_eq!(now_playing.artist_name, "");
        assert_eq!(now_playing.album_image, "");
        assert!(!now_playing.is_playing);
    }
}
