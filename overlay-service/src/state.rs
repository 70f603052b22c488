use std::sync::Arc;

use crate::buffer::MessageBuffer;
use crate::config::Config;
use crate::models::NowPlayingState;
use crate::services::supervisor::ServiceSupervisor;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub buffer: MessageBuffer,
    pub now_playing: NowPlayingState,
    pub supervisor: ServiceSupervisor,
}
