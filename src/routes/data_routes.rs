use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::fs;
use tracing::debug;

use gwfetch::core::listing::{list_channels, list_downloads, list_segments, ChannelListing, ChannelRef};
use gwfetch::core::package::{find_package, validate_key, ARCHIVE_EXT};

use crate::models::api_model::SegmentsQuery;
use crate::routes::api_error::{single_component, ApiError, ApiResult};
use crate::state::app_state::AppState;

pub fn data_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/downloads", get(downloads))
        .route("/api/channels", get(channels))
        .route("/api/segments", get(segments))
        .route("/api/package/{key}", get(package))
        .with_state(state)
}

/// Runs a blocking directory walk off the async workers.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> gwfetch::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("listing task failed: {}", e)))?
        .map_err(ApiError::from)
}

async fn downloads(State(state): State<AppState>) -> ApiResult<Json<Vec<ChannelListing>>> {
    let gwf_dir = state.config.data.gwf_dir.clone();
    let base = state.config.data.base.clone();
    Ok(Json(blocking(move || list_downloads(&gwf_dir, &base)).await?))
}

async fn channels(State(state): State<AppState>) -> ApiResult<Json<Vec<ChannelRef>>> {
    let gwf_dir = state.config.data.gwf_dir.clone();
    Ok(Json(blocking(move || list_channels(&gwf_dir)).await?))
}

async fn segments(
    State(state): State<AppState>,
    Query(query): Query<SegmentsQuery>,
) -> ApiResult<Json<Vec<String>>> {
    single_component(&query.dir, "dir")?;
    let channel_dir = state.config.data.gwf_dir.join(&query.dir);
    Ok(Json(blocking(move || list_segments(&channel_dir)).await?))
}

async fn package(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<Response> {
    validate_key(&key).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let path = find_package(&state.config.data.scratch_dir, &key)
        .ok_or_else(|| ApiError::not_found("not ready"))?;
    debug!("Serving package {}", path.display());

    let bytes = fs::read(&path).await.map_err(|e| ApiError::internal(e.to_string()))?;
    let disposition = format!("attachment; filename=\"{}.{}\"", key, ARCHIVE_EXT);

    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
