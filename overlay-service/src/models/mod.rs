pub mod message;
pub mod now_playing;

pub use message::{ChatMessage, MessageKind, Role};
pub use now_playing::{NowPlaying, NowPlayingState};
