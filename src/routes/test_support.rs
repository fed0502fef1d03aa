use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tempfile::TempDir;
use tokio::net::TcpListener;

use gwfetch::{Channel, Job, Location, OmicronSettings, ProcessRunner, Segment, SegmentBackend};

use crate::models::config_model::ServerConfig;
use crate::state::app_state::AppState;

/// One frame per segment; the content is the source string.
pub struct StubBackend;

#[async_trait]
impl SegmentBackend for StubBackend {
    fn name(&self) -> &str {
        "STUB"
    }

    async fn resolve_locations(&self, _channel: &Channel, segment: &Segment) -> gwfetch::Result<Vec<Location>> {
        Ok(vec![Location {
            source: format!("stub://{}", segment),
            file_name: format!("H-H1_TEST-{}-{}.gwf", segment.start, segment.duration()),
            span: Some((segment.start, segment.duration())),
        }])
    }

    async fn retrieve(&self, location: &Location, dest: &Path) -> gwfetch::Result<u64> {
        tokio::fs::write(dest, location.source.as_bytes()).await?;
        Ok(location.source.len() as u64)
    }
}

pub fn test_config(dir: &TempDir) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.data.base = dir.path().to_path_buf();
    config.data.gwf_dir = dir.path().join("GWFout");
    config.data.scratch_dir = dir.path().join("packages");
    config.courtesy_delay_ms = 0;
    config.poll_interval_ms = 10;
    config.omicron = OmicronSettings {
        binary: dir.path().join("omicron.sh").to_string_lossy().into_owned(),
        launcher: vec!["sh".to_string()],
        output_dir: dir.path().join("OmicronOut"),
        working_dir: Some(dir.path().to_path_buf()),
        config_path: PathBuf::from("config.txt"),
    };
    config
}

pub fn test_state(dir: &TempDir) -> AppState {
    let config = test_config(dir);
    let runner = Arc::new(ProcessRunner::new(config.omicron.clone()));
    AppState::with_backends(config, Arc::new(StubBackend), Arc::new(StubBackend), runner)
}

pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn wait_finished(job: &Job) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !job.state().is_finished() {
            let _ = tokio::time::timeout(Duration::from_millis(20), job.log.changed()).await;
        }
    })
    .await
    .expect("job did not finish");
}
