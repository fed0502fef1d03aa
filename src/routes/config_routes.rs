use std::path::PathBuf;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::fs;
use tracing::info;

use gwfetch::core::constants::PARTIAL_SUFFIX;

use crate::models::api_model::ConfigContent;
use crate::routes::api_error::{ApiError, ApiResult};
use crate::state::app_state::AppState;

pub fn config_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/config", get(read_config).post(save_config))
        .with_state(state)
}

/// The file Omicron receives as its config argument, resolved like the child resolves it.
fn config_file(state: &AppState) -> PathBuf {
    let omicron = &state.config.omicron;
    match &omicron.working_dir {
        Some(dir) if omicron.config_path.is_relative() => dir.join(&omicron.config_path),
        _ => omicron.config_path.clone(),
    }
}

async fn read_config(State(state): State<AppState>) -> ApiResult<Response> {
    let path = config_file(&state);
    match fs::read_to_string(&path).await {
        Ok(content) => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            content,
        )
            .into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::not_found(format!("config not found: {}", path.display())))
        }
        Err(e) => Err(ApiError::internal(format!("cannot read {}: {}", path.display(), e))),
    }
}

async fn save_config(
    State(state): State<AppState>,
    Json(body): Json<ConfigContent>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = config_file(&state);
    let mut partial = path.clone().into_os_string();
    partial.push(PARTIAL_SUFFIX);

    let written = async {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&partial, body.content.as_bytes()).await?;
        fs::rename(&partial, &path).await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&partial).await;
        return Err(ApiError::internal(format!("cannot save {}: {}", path.display(), e)));
    }

    info!("Omicron config saved to {}", path.display());
    Ok(Json(json!({ "status": "saved" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{serve, test_state};
    use serde_json::Value;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_read_and_save() {
        let dir = TempDir::new().unwrap();
        let addr = serve(config_routes(test_state(&dir))).await;
        let client = reqwest::Client::new();
        let url = format!("http://{}/api/config", addr);

        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("config.txt"));

        let resp = client
            .post(&url)
            .json(&serde_json::json!({"content": "DATA CHANNELS H1:TEST\n"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "saved");

        // Saved next to where the runner's child resolves it.
        assert_eq!(
            std::fs::read_to_string(dir.path().join("config.txt")).unwrap(),
            "DATA CHANNELS H1:TEST\n"
        );
        assert!(!dir.path().join("config.txt.part").exists());

        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.text().await.unwrap(), "DATA CHANNELS H1:TEST\n");
    }
}
