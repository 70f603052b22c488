use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::buffer::MessageBuffer;
use crate::config::Config;
use crate::error::{AppError, AppResult, ErrorKind};
use crate::models::NowPlayingState;
use crate::services::connector::{ChatConfig, SessionConnector};
use crate::services::music::NowPlayingPoller;
use crate::services::SessionEnd;

pub const MODULE_CHAT: &str = "chat";
pub const MODULE_MUSIC: &str = "music-widget";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Stopped,
    Starting,
    Running,
    Failed,
}

/// Operator-facing view of one module's lifecycle record.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleStatus {
    pub name: String,
    pub enabled: bool,
    pub state: ModuleState,
    pub last_error: Option<ErrorKind>,
}

struct ModuleRecord {
    enabled: bool,
    state: ModuleState,
    last_error: Option<ErrorKind>,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl ModuleRecord {
    fn new() -> Self {
        Self {
            enabled: false,
            state: ModuleState::Stopped,
            last_error: None,
            stop_tx: None,
            task: None,
        }
    }
}

type ModuleMap = Arc<Mutex<HashMap<String, ModuleRecord>>>;

fn lock_map(map: &ModuleMap) -> MutexGuard<'_, HashMap<String, ModuleRecord>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write access to one module's lifecycle record, handed to the background
/// task so it can report its own transitions.
#[derive(Clone)]
pub struct LifecycleHandle {
    modules: ModuleMap,
    name: String,
}

impl LifecycleHandle {
    /// First `Listening` reached; promote `Starting` to `Running`.
    pub(crate) fn set_running(&self) {
        let mut guard = lock_map(&self.modules);
        if let Some(record) = guard.get_mut(&self.name) {
            if record.state == ModuleState::Starting {
                record.state = ModuleState::Running;
                info!(module = %self.name, "module running");
            }
        }
    }

    /// Terminal exit of the task.
    pub(crate) fn finish(&self, end: SessionEnd) {
        let mut guard = lock_map(&self.modules);
        if let Some(record) = guard.get_mut(&self.name) {
            match end {
                SessionEnd::Stopped => {
                    record.state = ModuleState::Stopped;
                    info!(module = %self.name, "module stopped");
                }
                SessionEnd::Failed(kind) => {
                    record.state = ModuleState::Failed;
                    record.last_error = Some(kind);
                    info!(module = %self.name, ?kind, "module failed");
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            modules: Arc::new(Mutex::new(HashMap::new())),
            name: "detached".to_string(),
        }
    }
}

/// Tracks one lifecycle record per named module and owns the background
/// tasks running them. The record map is the only cross-task shared state
/// here, and it is only touched through these methods.
#[derive(Clone)]
pub struct ServiceSupervisor {
    modules: ModuleMap,
    config: Arc<Config>,
    chat_cfg: ChatConfig,
    buffer: MessageBuffer,
    now_playing: NowPlayingState,
}

impl ServiceSupervisor {
    pub fn new(
        config: Arc<Config>,
        chat_cfg: ChatConfig,
        buffer: MessageBuffer,
        now_playing: NowPlayingState,
    ) -> Self {
        let mut map = HashMap::new();
        map.insert(MODULE_CHAT.to_string(), ModuleRecord::new());
        map.insert(MODULE_MUSIC.to_string(), ModuleRecord::new());
        Self {
            modules: Arc::new(Mutex::new(map)),
            config,
            chat_cfg,
            buffer,
            now_playing,
        }
    }

    /// Start a module. Idempotent while the module is starting or running.
    ///
    /// Missing configuration fails fast, before anything is spawned, and
    /// leaves the record untouched. The configuration check, the state flip,
    /// and the spawn all happen under the record lock so a module can never
    /// be run by two tasks at once.
    pub fn start(&self, name: &str) -> AppResult<()> {
        let mut guard = lock_map(&self.modules);
        let record = guard
            .get_mut(name)
            .ok_or_else(|| AppError::UnknownModule(name.to_string()))?;

        if matches!(record.state, ModuleState::Starting | ModuleState::Running) {
            return Ok(());
        }

        // The record is terminal, so the previous task has already reported
        // its exit; aborting the finished handle is just cleanup.
        if let Some(old_task) = record.task.take() {
            old_task.abort();
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let lifecycle = LifecycleHandle {
            modules: self.modules.clone(),
            name: name.to_string(),
        };

        let task = match name {
            MODULE_CHAT => {
                let channel_id = self.config.chat.channel_id.clone().ok_or_else(|| {
                    AppError::MissingConfiguration("chat channel id is not configured".into())
                })?;
                let connector = SessionConnector::new(
                    self.chat_cfg.clone(),
                    channel_id,
                    self.buffer.clone(),
                    stop_rx,
                    lifecycle.clone(),
                );
                tokio::spawn(async move {
                    let end = connector.run().await;
                    lifecycle.finish(end);
                })
            }
            MODULE_MUSIC => {
                if !self.config.music.configured() {
                    return Err(AppError::MissingConfiguration(
                        "music credentials are not configured".into(),
                    ));
                }
                let poller = NowPlayingPoller::new(
                    self.config.music.clone(),
                    self.now_playing.clone(),
                    stop_rx,
                    lifecycle.clone(),
                );
                tokio::spawn(async move {
                    let end = poller.run().await;
                    lifecycle.finish(end);
                })
            }
            other => return Err(AppError::UnknownModule(other.to_string())),
        };

        record.enabled = true;
        record.state = ModuleState::Starting;
        record.last_error = None;
        record.stop_tx = Some(stop_tx);
        record.task = Some(task);
        info!(module = name, "module starting");
        Ok(())
    }

    /// Request a stop and return without waiting for task exit; the task
    /// observes the signal at its next decision point. Idempotent.
    pub fn stop(&self, name: &str) -> AppResult<()> {
        let mut guard = lock_map(&self.modules);
        let record = guard
            .get_mut(name)
            .ok_or_else(|| AppError::UnknownModule(name.to_string()))?;

        record.enabled = false;
        if let Some(stop_tx) = &record.stop_tx {
            let _ = stop_tx.send(true);
        }
        info!(module = name, "module stop requested");
        Ok(())
    }

    pub fn status(&self, name: &str) -> AppResult<ModuleStatus> {
        let guard = lock_map(&self.modules);
        let record = guard
            .get(name)
            .ok_or_else(|| AppError::UnknownModule(name.to_string()))?;
        Ok(Self::status_of(name, record))
    }

    pub fn status_all(&self) -> Vec<ModuleStatus> {
        let guard = lock_map(&self.modules);
        let mut statuses: Vec<_> = guard
            .iter()
            .map(|(name, record)| Self::status_of(name, record))
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    fn status_of(name: &str, record: &ModuleRecord) -> ModuleStatus {
        ModuleStatus {
            name: name.to_string(),
            enabled: record.enabled,
            state: record.state,
            last_error: record.last_error,
        }
    }
}
