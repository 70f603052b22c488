use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use overlay_service::{
    buffer::MessageBuffer,
    config::Config,
    error::AppError,
    logging,
    models::NowPlayingState,
    routes,
    services::connector::ChatConfig,
    services::supervisor::{ServiceSupervisor, MODULE_CHAT, MODULE_MUSIC},
    state::AppState,
};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let config = Arc::new(Config::from_env()?);

    let buffer = MessageBuffer::new(config.chat.buffer_capacity);
    let now_playing = NowPlayingState::new();

    let chat_cfg = ChatConfig {
        dedup_window: 2 * config.chat.buffer_capacity,
        ..ChatConfig::default()
    };
    let supervisor = ServiceSupervisor::new(
        config.clone(),
        chat_cfg,
        buffer.clone(),
        now_playing.clone(),
    );

    // Persisted operator intent: bring enabled modules up at boot.
    if config.chat.autostart {
        if let Err(err) = supervisor.start(MODULE_CHAT) {
            warn!(%err, "chat module autostart failed");
        }
    }
    if config.music.autostart {
        if let Err(err) = supervisor.start(MODULE_MUSIC) {
            warn!(%err, "music-widget module autostart failed");
        }
    }

    let state = AppState {
        config: config.clone(),
        buffer,
        now_playing,
        supervisor,
    };

    let bind_addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(%bind_addr, "starting overlay-service");

    HttpServer::new(move || {
        // Overlay pages are loaded from OBS browser sources and arbitrary
        // local origins, so the read API stays wide open.
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .service(routes::messages::get_messages)
            .service(routes::now_playing::get_now_playing)
            .service(routes::modules::module_status)
            .service(routes::modules::start_module)
            .service(routes::modules::stop_module)
            .route("/health", web::get().to(|| async { "OK" }))
    })
    .bind(&bind_addr)
    .map_err(|e| AppError::StartServer(format!("bind {bind_addr}: {e}")))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(format!("run server: {e}")))
}
