use actix_web::{get, web, HttpResponse};

use crate::error::AppError;
use crate::models::NowPlaying;
use crate::state::AppState;

/// GET /music/api/now-playing
#[get("/music/api/now-playing")]
pub async fn get_now_playing(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let snapshot = state
        .now_playing
        .snapshot()
        .await
        .unwrap_or_else(NowPlaying::idle);
    Ok(HttpResponse::Ok().json(snapshot))
}
