use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ModuleActionRequest {
    pub module: String,
}

/// GET /api/modules/status
#[get("/api/modules/status")]
pub async fn module_status(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let modules: serde_json::Map<String, serde_json::Value> = state
        .supervisor
        .status_all()
        .into_iter()
        .map(|status| {
            (
                status.name.clone(),
                json!({
                    "enabled": status.enabled,
                    "state": status.state,
                    "last_error": status.last_error,
                }),
            )
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({ "modules": modules })))
}

/// POST /api/modules/start
#[post("/api/modules/start")]
pub async fn start_module(
    state: web::Data<AppState>,
    body: web::Json<ModuleActionRequest>,
) -> Result<HttpResponse, AppError> {
    state.supervisor.start(&body.module)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "module": body.module })))
}

/// POST /api/modules/stop
#[post("/api/modules/stop")]
pub async fn stop_module(
    state: web::Data<AppState>,
    body: web::Json<ModuleActionRequest>,
) -> Result<HttpResponse, AppError> {
    state.supervisor.stop(&body.module)?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "module": body.module })))
}
