use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BUFFER_CAPACITY: usize = 50;
const DEFAULT_MUSIC_POLL_SECS: u64 = 5;
const DEFAULT_MUSIC_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const DEFAULT_MUSIC_API_URL: &str = "https://api.spotify.com/v1";

#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Human-facing channel identifier, immutable for a session's lifetime.
    /// `start("chat")` fails fast when unset.
    pub channel_id: Option<String>,
    pub buffer_capacity: usize,
    pub autostart: bool,
}

#[derive(Debug, Clone)]
pub struct MusicSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub poll_interval: Duration,
    pub autostart: bool,
    pub token_url: String,
    pub api_url: String,
}

impl MusicSettings {
    pub fn configured(&self) -> bool {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.trim().is_empty())
        }
        present(&self.client_id) && present(&self.client_secret) && present(&self.refresh_token)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub chat: ChatSettings,
    pub music: MusicSettings,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        dotenv().ok();

        let port = parse_var("OVERLAY_PORT", DEFAULT_PORT)?;
        let buffer_capacity = parse_var("CHAT_BUFFER_CAPACITY", DEFAULT_BUFFER_CAPACITY)?;
        if buffer_capacity == 0 {
            return Err(AppError::Config(
                "CHAT_BUFFER_CAPACITY must be at least 1".into(),
            ));
        }

        let chat = ChatSettings {
            channel_id: non_empty_var("CHAT_CHANNEL_ID"),
            buffer_capacity,
            autostart: flag_var("CHAT_AUTOSTART"),
        };

        let music = MusicSettings {
            client_id: non_empty_var("MUSIC_CLIENT_ID"),
            client_secret: non_empty_var("MUSIC_CLIENT_SECRET"),
            refresh_token: non_empty_var("MUSIC_REFRESH_TOKEN"),
            poll_interval: Duration::from_secs(parse_var(
                "MUSIC_POLL_INTERVAL_SECS",
                DEFAULT_MUSIC_POLL_SECS,
            )?),
            autostart: flag_var("MUSIC_AUTOSTART"),
            token_url: env::var("MUSIC_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_MUSIC_TOKEN_URL.to_string()),
            api_url: env::var("MUSIC_API_URL").unwrap_or_else(|_| DEFAULT_MUSIC_API_URL.to_string()),
        };

        Ok(Self { port, chat, music })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn flag_var(key: &str) -> bool {
    env::var(key)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} is not a valid value: {raw}"))),
        Err(_) => Ok(default),
    }
}
