use std::sync::Arc;
use std::time::Duration;

use overlay_service::buffer::MessageBuffer;
use overlay_service::config::{ChatSettings, Config, MusicSettings};
use overlay_service::error::AppError;
use overlay_service::models::NowPlayingState;
use overlay_service::services::connector::ChatConfig;
use overlay_service::services::supervisor::{
    ModuleState, ServiceSupervisor, MODULE_CHAT, MODULE_MUSIC,
};

/// Credentials point at a closed local port so no poll cycle ever leaves the
/// machine; the poller just logs failed cycles, which is all these tests
/// need.
fn test_config(channel_id: Option<&str>, music_configured: bool) -> Config {
    let credential = if music_configured {
        Some("credential".to_string())
    } else {
        None
    };
    Config {
        port: 0,
        chat: ChatSettings {
            channel_id: channel_id.map(str::to_string),
            buffer_capacity: 10,
            autostart: false,
        },
        music: MusicSettings {
            client_id: credential.clone(),
            client_secret: credential.clone(),
            refresh_token: credential,
            poll_interval: Duration::from_millis(50),
            autostart: false,
            token_url: "http://127.0.0.1:1".to_string(),
            api_url: "http://127.0.0.1:1".to_string(),
        },
    }
}

fn supervisor(config: Config) -> ServiceSupervisor {
    ServiceSupervisor::new(
        Arc::new(config),
        ChatConfig::default(),
        MessageBuffer::new(10),
        NowPlayingState::new(),
    )
}

async fn wait_for_state(supervisor: &ServiceSupervisor, module: &str, expected: ModuleState) {
    for _ in 0..100 {
        if supervisor.status(module).unwrap().state == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "module {module} never reached {expected:?}, currently {:?}",
        supervisor.status(module).unwrap().state
    );
}

#[tokio::test]
async fn start_chat_without_channel_id_fails_fast() {
    let supervisor = supervisor(test_config(None, false));

    let err = supervisor.start(MODULE_CHAT).unwrap_err();
    assert!(matches!(err, AppError::MissingConfiguration(_)));

    let status = supervisor.status(MODULE_CHAT).unwrap();
    assert_eq!(status.state, ModuleState::Stopped);
    assert!(!status.enabled);
}

#[tokio::test]
async fn unknown_module_names_are_rejected() {
    let supervisor = supervisor(test_config(None, false));

    assert!(matches!(
        supervisor.start("video-widget"),
        Err(AppError::UnknownModule(_))
    ));
    assert!(matches!(
        supervisor.stop("video-widget"),
        Err(AppError::UnknownModule(_))
    ));
    assert!(matches!(
        supervisor.status("video-widget"),
        Err(AppError::UnknownModule(_))
    ));
}

#[tokio::test]
async fn start_music_without_credentials_fails_fast() {
    let supervisor = supervisor(test_config(None, false));

    let err = supervisor.start(MODULE_MUSIC).unwrap_err();
    assert!(matches!(err, AppError::MissingConfiguration(_)));
    assert_eq!(
        supervisor.status(MODULE_MUSIC).unwrap().state,
        ModuleState::Stopped
    );
}

#[tokio::test]
async fn start_is_idempotent_and_stop_parks_the_module() {
    let supervisor = supervisor(test_config(None, true));

    supervisor.start(MODULE_MUSIC).unwrap();
    wait_for_state(&supervisor, MODULE_MUSIC, ModuleState::Running).await;

    // A second start while running is a no-op success.
    supervisor.start(MODULE_MUSIC).unwrap();
    assert_eq!(
        supervisor.status(MODULE_MUSIC).unwrap().state,
        ModuleState::Running
    );

    supervisor.stop(MODULE_MUSIC).unwrap();
    wait_for_state(&supervisor, MODULE_MUSIC, ModuleState::Stopped).await;
    assert!(!supervisor.status(MODULE_MUSIC).unwrap().enabled);

    // Stopping an already-stopped module is a no-op success too.
    supervisor.stop(MODULE_MUSIC).unwrap();
    assert_eq!(
        supervisor.status(MODULE_MUSIC).unwrap().state,
        ModuleState::Stopped
    );
}

#[tokio::test]
async fn module_can_be_restarted_after_a_stop() {
    let supervisor = supervisor(test_config(None, true));

    supervisor.start(MODULE_MUSIC).unwrap();
    wait_for_state(&supervisor, MODULE_MUSIC, ModuleState::Running).await;
    supervisor.stop(MODULE_MUSIC).unwrap();
    wait_for_state(&supervisor, MODULE_MUSIC, ModuleState::Stopped).await;

    supervisor.start(MODULE_MUSIC).unwrap();
    wait_for_state(&supervisor, MODULE_MUSIC, ModuleState::Running).await;
    assert!(supervisor.status(MODULE_MUSIC).unwrap().enabled);

    supervisor.stop(MODULE_MUSIC).unwrap();
    wait_for_state(&supervisor, MODULE_MUSIC, ModuleState::Stopped).await;
}

#[tokio::test]
async fn status_lists_every_known_module() {
    let supervisor = supervisor(test_config(Some("channel"), false));

    let statuses = supervisor.status_all();
    let names: Vec<_> = statuses.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec![MODULE_CHAT, MODULE_MUSIC]);
    assert!(statuses
        .iter()
        .all(|s| s.state == ModuleState::Stopped && !s.enabled && s.last_error.is_none()));
}
