use axum::{
    routing::get,
    Router,
    response::{IntoResponse, Response},
    Json,
};

use serde::Serialize;
use tracing::debug;

use crate::routes::api_error::ApiError;

pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(info_check))
}

pub async fn info_check() -> Response {
    match crate::utils::conf_helper::get_cached_config() {
        Some(config) => {
            debug!("{} info requested", config.name);
            Json(config).into_response()
        }
        None => ApiError::internal("config not initialized").into_response(),
    }
}

async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}

#[derive(Serialize)]
pub struct HealthStatus {
    status: &'static str,
}
