use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Snapshot of the currently-playing track, as served to the music widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub is_playing: bool,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    pub album_image: String,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub external_url: String,
}

impl NowPlaying {
    /// Placeholder published when nothing is playing (the upstream answers
    /// 204 in that case).
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Shared now-playing snapshot, written by the poller and read by the
/// gateway. Readers always get an owned copy.
#[derive(Clone, Default)]
pub struct NowPlayingState {
    inner: Arc<RwLock<Option<NowPlaying>>>,
}

impl NowPlayingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update(&self, value: NowPlaying) {
        *self.inner.write().await = Some(value);
    }

    pub async fn snapshot(&self) -> Option<NowPlaying> {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_reflects_last_update() {
        let state = NowPlayingState::new();
        assert!(state.snapshot().await.is_none());

        state
            .update(NowPlaying {
                is_playing: true,
                track_name: "Test Track".into(),
                ..NowPlaying::default()
            })
            .await;

        let snap = state.snapshot().await.expect("snapshot");
        assert!(snap.is_playing);
        assert_eq!(snap.track_name, "Test Track");
    }
}
