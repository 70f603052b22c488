use actix_web::{get, web, HttpResponse};

use crate::error::AppError;
use crate::state::AppState;

/// GET /chat/api/messages
///
/// Current buffer snapshot as a JSON array, newest-last. Polling consumers
/// diff against the array length; apart from head-eviction the content is
/// monotonically non-decreasing.
#[get("/chat/api/messages")]
pub async fn get_messages(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let snapshot = state.buffer.snapshot().await;
    Ok(HttpResponse::Ok().json(snapshot))
}
