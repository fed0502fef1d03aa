use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::info;

use gwfetch::{Channel, FetchJob, JobKind, RunJob};

use crate::models::api_model::{JobAccepted, NdsRequest, OmicronRequest, OsdfRequest};
use crate::routes::api_error::{single_component, ApiError, ApiResult};
use crate::state::app_state::AppState;

pub fn gravfetch_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/gravfetch/osdf", post(submit_osdf))
        .route("/api/gravfetch/nds", post(submit_nds))
        .route("/api/omicron/run", post(submit_omicron))
        .with_state(state)
}

type Accepted = (StatusCode, Json<JobAccepted>);

fn required(value: &str, field: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{} is required", field)));
    }
    Ok(())
}

async fn submit_osdf(
    State(state): State<AppState>,
    Json(request): Json<OsdfRequest>,
) -> ApiResult<Accepted> {
    required(&request.detector, "detector")?;
    required(&request.frametype, "frametype")?;

    let channel = Channel::from_site_and_frametype(request.detector.trim(), request.frametype.trim());
    channel.validate()?;
    let job = state
        .driver
        .submit_fetch(
            state.osdf.clone(),
            state.fetch_options(),
            state.scratch_dir(),
            FetchJob {
                kind: JobKind::Osdf,
                channel,
                segments: request.segments,
                package: request.package,
            },
        )
        .await;

    info!("OSDF job {} started", job.id);
    Ok((StatusCode::ACCEPTED, Json(JobAccepted::started(job.id))))
}

async fn submit_nds(
    State(state): State<AppState>,
    Json(request): Json<NdsRequest>,
) -> ApiResult<Accepted> {
    required(&request.channel, "channel")?;
    let channel = Channel::new(request.channel.trim());
    channel.validate()?;

    let job = state
        .driver
        .submit_fetch(
            state.nds.clone(),
            state.fetch_options(),
            state.scratch_dir(),
            FetchJob {
                kind: JobKind::Nds,
                channel,
                segments: request.segments,
                package: request.package,
            },
        )
        .await;

    info!("NDS job {} started", job.id);
    Ok((StatusCode::ACCEPTED, Json(JobAccepted::started(job.id))))
}

async fn submit_omicron(
    State(state): State<AppState>,
    Json(request): Json<OmicronRequest>,
) -> ApiResult<Accepted> {
    single_component(&request.channel_dir, "channel_dir")?;

    let config_path = request
        .config_path
        .unwrap_or_else(|| state.config.omicron.config_path.clone());

    let job = state
        .driver
        .submit_run(
            state.runner.clone(),
            RunJob {
                channel_dir: state.config.data.gwf_dir.join(&request.channel_dir),
                segments: request.segments,
                config_path,
                manifest_base: state.config.data.base.clone(),
            },
        )
        .await;

    info!("Omicron job {} started", job.id);
    Ok((StatusCode::ACCEPTED, Json(JobAccepted::started(job.id))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{serve, test_state, wait_finished};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_nds_submit_runs_to_completion() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let addr = serve(gravfetch_routes(state.clone())).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{}/api/gravfetch/nds", addr))
            .json(&json!({"channel": "H1:TEST", "segments": ["100_110"], "package": false}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "started");
        let id = body["job_id"].as_str().unwrap().parse().unwrap();

        let job = state.registry().get(&id).await.unwrap();
        wait_finished(&job).await;
        assert!(dir.path().join("GWFout/H1_TEST/100_110/H-H1_TEST-100-10.gwf").exists());
        assert!(dir.path().join("GWFout/H1_TEST/fin.ffl").exists());
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let dir = TempDir::new().unwrap();
        let addr = serve(gravfetch_routes(test_state(&dir))).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("http://{}/api/gravfetch/osdf", addr))
            .json(&json!({"detector": " ", "frametype": "H1_HOFT_C00", "segments": []}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "detector is required");

        let resp = client
            .post(format!("http://{}/api/omicron/run", addr))
            .json(&json!({"channel_dir": "../H1_TEST", "segments": []}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_channel_escaping_data_root_rejected() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let addr = serve(gravfetch_routes(state.clone())).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("http://{}/api/gravfetch/nds", addr))
            .json(&json!({"channel": "../../x", "segments": ["100_110"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("../../x"));

        let resp = client
            .post(format!("http://{}/api/gravfetch/osdf", addr))
            .json(&json!({"detector": "..", "frametype": "../x", "segments": ["100_110"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

        assert!(state.registry().list().await.is_empty());
        assert!(!dir.path().join("x").exists());
    }
}
