use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use gwfetch::{CancelResult, Job, JobStatus, LogLine, LogTail, TailItem};

use crate::routes::api_error::{ApiError, ApiResult};
use crate::routes::ws_handler::handle_ws_tail;
use crate::state::app_state::AppState;

#[derive(Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub status: JobStatus,
    pub log: Vec<LogLine>,
}

pub fn job_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/{id}", get(job_detail).delete(cancel_job))
        .route("/api/jobs/{id}/stream", get(stream_job))
        .route("/api/jobs/{id}/ws", get(ws_job))
        .with_state(state)
}

async fn find_job(state: &AppState, id: &str) -> ApiResult<Arc<Job>> {
    let uuid: Uuid = id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid job id: {}", id)))?;
    state
        .registry()
        .get(&uuid)
        .await
        .ok_or_else(|| ApiError::not_found(format!("job not found: {}", id)))
}

async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobStatus>> {
    Json(state.registry().list().await)
}

async fn job_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobDetail>> {
    let job = find_job(&state, &id).await?;
    // Lines before status, so the line count never exceeds the log shown.
    let log = job.log.snapshot();
    Ok(Json(JobDetail {
        status: job.status(),
        log,
    }))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let uuid: Uuid = id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid job id: {}", id)))?;

    match state.registry().cancel(&uuid).await {
        CancelResult::Requested => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "cancelling", "job_id": uuid })),
        )
            .into_response()),
        CancelResult::NotFound => Err(ApiError::not_found(format!("job not found: {}", id))),
        CancelResult::AlreadyFinished => Err(ApiError::conflict("job already finished")),
    }
}

/// Resume point from an SSE reconnect: the line after the last one seen.
fn resume_cursor(headers: &HeaderMap) -> usize {
    headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .and_then(|seq| seq.checked_add(1))
        .unwrap_or(0)
}

fn tail_events(item: TailItem) -> Vec<Event> {
    match item {
        TailItem::Lines(lines) => lines
            .iter()
            .filter_map(|line| {
                Event::default()
                    .event(line.level.as_str())
                    .id(line.seq.to_string())
                    .json_data(line)
                    .map_err(|e| warn!("sse encode failed: {}", e))
                    .ok()
            })
            .collect(),
        TailItem::End(status) => Event::default()
            .event("end")
            .json_data(&status)
            .map_err(|e| warn!("sse encode failed: {}", e))
            .ok()
            .into_iter()
            .collect(),
    }
}

pub fn sse_events(tail: LogTail) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    tail.into_stream()
        .flat_map(|item| futures::stream::iter(tail_events(item)))
        .map(Ok)
}

async fn stream_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let job = find_job(&state, &id).await?;
    let cursor = resume_cursor(&headers);
    debug!("SSE tail for job {} from line {}", job.id, cursor);

    let tail = LogTail::with_poll_interval(job, state.config.poll_interval()).from_cursor(cursor);
    Ok(Sse::new(sse_events(tail)).keep_alive(KeepAlive::default()))
}

async fn ws_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let job = find_job(&state, &id).await?;
    let tail = LogTail::with_poll_interval(job, state.config.poll_interval());
    Ok(ws.on_upgrade(move |socket| handle_ws_tail(socket, tail)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{serve, test_state, wait_finished};
    use gwfetch::{FetchJob, JobKind, LogEvent};
    use serde_json::Value;
    use tempfile::TempDir;

    #[test]
    fn test_resume_cursor() {
        let mut headers = HeaderMap::new();
        assert_eq!(resume_cursor(&headers), 0);
        headers.insert("last-event-id", "4".parse().unwrap());
        assert_eq!(resume_cursor(&headers), 5);
        headers.insert("last-event-id", usize::MAX.to_string().parse().unwrap());
        assert_eq!(resume_cursor(&headers), 0);
        headers.insert("last-event-id", "-3".parse().unwrap());
        assert_eq!(resume_cursor(&headers), 0);
    }

    #[tokio::test]
    async fn test_job_lifecycle_over_http() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let addr = serve(job_routes(state.clone())).await;
        let client = reqwest::Client::new();

        let job = state
            .driver
            .submit_fetch(
                state.nds.clone(),
                state.fetch_options(),
                state.scratch_dir(),
                FetchJob {
                    kind: JobKind::Nds,
                    channel: gwfetch::Channel::new("H1:TEST"),
                    segments: vec!["100_110".to_string(), "120_125".to_string()],
                    package: true,
                },
            )
            .await;
        wait_finished(&job).await;

        let list: Value = client
            .get(format!("http://{}/api/jobs", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(list.as_array().unwrap().len(), 1);

        let detail: Value = client
            .get(format!("http://{}/api/jobs/{}", addr, job.id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(detail["state"], "succeeded");
        assert_eq!(detail["result"]["type"], "fetch");
        assert_eq!(detail["result"]["summary"]["downloaded"], 2);
        assert_eq!(detail["result"]["package"], "H1_TEST");
        assert!(detail["log"]
            .as_array()
            .unwrap()
            .iter()
            .any(|l| l["message"] == "Package ready: H1_TEST"));

        let resp = client
            .delete(format!("http://{}/api/jobs/{}", addr, job.id))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);

        let resp = client
            .delete(format!("http://{}/api/jobs/{}", addr, Uuid::new_v4()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        let resp = client
            .get(format!("http://{}/api/jobs/not-a-uuid", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sse_stream_ends_with_status() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let addr = serve(job_routes(state.clone())).await;

        let job = state.registry().create(JobKind::Omicron).await;
        job.log.append(LogEvent::info("hello"));

        let writer = job.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            writer.log.append(LogEvent::warning("careful"));
            writer.finish(
                gwfetch::JobState::Failed,
                gwfetch::JobResult::Fault {
                    message: "stopped".into(),
                },
            );
        });

        let body = reqwest::get(format!("http://{}/api/jobs/{}/stream", addr, job.id))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        let hello = body.find("event: info").unwrap();
        let careful = body.find("event: warning").unwrap();
        let end = body.find("event: end").unwrap();
        assert!(hello < careful && careful < end);
        assert!(body.contains("\"state\":\"failed\""));
    }

    #[tokio::test]
    async fn test_sse_resumes_after_last_event_id() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let addr = serve(job_routes(state.clone())).await;

        let job = state.registry().create(JobKind::Nds).await;
        job.log.append(LogEvent::info("zero"));
        job.log.append(LogEvent::info("one"));
        job.finish(
            gwfetch::JobState::Succeeded,
            gwfetch::JobResult::Fault { message: String::new() },
        );

        let body = reqwest::Client::new()
            .get(format!("http://{}/api/jobs/{}/stream", addr, job.id))
            .header("Last-Event-ID", "0")
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(!body.contains("zero"));
        assert!(body.contains("one"));
        assert!(body.contains("event: end"));
    }

    #[tokio::test]
    async fn test_ws_tail_frames_in_order_then_end() {
        use tokio_tungstenite::tungstenite::Message as WsMessage;

        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let addr = serve(job_routes(state.clone())).await;

        let job = state.registry().create(JobKind::Nds).await;
        job.log.append(LogEvent::info("zero"));
        job.log.append(LogEvent::info("one"));

        let writer = job.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            writer.log.append(LogEvent::error("two"));
            writer.finish(
                gwfetch::JobState::Failed,
                gwfetch::JobResult::Fault { message: "two".into() },
            );
        });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/api/jobs/{}/ws", addr, job.id))
            .await
            .unwrap();

        let mut frames = Vec::new();
        let collected = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            while let Some(msg) = ws.next().await {
                match msg.unwrap() {
                    WsMessage::Text(text) => {
                        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                        let done = frame["end_flag"] == true;
                        frames.push(frame);
                        if done {
                            break;
                        }
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
        })
        .await;
        assert!(collected.is_ok());

        assert_eq!(frames.len(), 4);
        let messages: Vec<&str> = frames[..3].iter().map(|f| f["message"].as_str().unwrap()).collect();
        assert_eq!(messages, vec!["zero", "one", "two"]);
        for (i, frame) in frames[..3].iter().enumerate() {
            assert_eq!(frame["seq"], i as u64);
            assert_eq!(frame["end_flag"], false);
        }
        assert_eq!(frames[2]["level"], "error");

        let end = &frames[3];
        assert_eq!(end["end_flag"], true);
        assert_eq!(end["seq"], 3);
        assert_eq!(end["status"]["state"], "failed");
        assert_eq!(end["status"]["lines"], 3);
    }

    #[tokio::test]
    async fn test_ws_unknown_job_is_not_found() {
        let dir = TempDir::new().unwrap();
        let addr = serve(job_routes(test_state(&dir))).await;

        let result =
            tokio_tungstenite::connect_async(format!("ws://{}/api/jobs/{}/ws", addr, Uuid::new_v4())).await;
        assert!(result.is_err());
    }
}
