// Background execution of fetch and processing jobs

use crate::core::error::Result;
use crate::core::fetch::{fetch_segments, FetchOptions, SegmentBackend};
use crate::core::format::Channel;
use crate::core::joblog::LogEvent;
use crate::core::jobs::{Job, JobKind, JobRegistry, JobResult, JobState};
use crate::core::manifest::Manifest;
use crate::core::omicron::{ProcessRunner, RunOutcome};
use crate::core::package::package_dir;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Clone)]
pub struct FetchJob {
    pub kind: JobKind,
    pub channel: Channel,
    pub segments: Vec<String>,
    /// Archive the channel directory once the fetch completes.
    pub package: bool,
}

#[derive(Debug, Clone)]
pub struct RunJob {
    pub channel_dir: PathBuf,
    pub segments: Vec<String>,
    pub config_path: PathBuf,
    /// Base for manifest paths when the manifest is rebuilt.
    pub manifest_base: PathBuf,
}

/// Starts jobs on background tasks and records their outcome in the registry.
#[derive(Clone)]
pub struct JobDriver {
    registry: JobRegistry,
}

impl JobDriver {
    pub fn new(registry: JobRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Registers a job, logs `accepted`, and runs `work` in the background.
    ///
    /// Returns as soon as the job is registered. An `Err` from `work` or a
    /// panic inside it becomes a single error line and a failed job.
    pub async fn spawn<F, Fut>(&self, kind: JobKind, accepted: Vec<LogEvent>, work: F) -> Arc<Job>
    where
        F: FnOnce(Arc<Job>) -> Fut,
        Fut: Future<Output = Result<JobResult>> + Send + 'static,
    {
        let job = self.registry.create(kind).await;
        for event in accepted {
            job.log.append(event);
        }

        let work = tokio::spawn(work(job.clone()));
        let task_job = job.clone();

        tokio::spawn(async move {
            let result = match work.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    task_job.log.append(LogEvent::error(format!("Job failed: {}", e)));
                    JobResult::Fault {
                        message: e.to_string(),
                    }
                }
                Err(e) => {
                    error!("Job {} task ended abnormally: {}", task_job.id, e);
                    let message = if e.is_panic() {
                        "job panicked".to_string()
                    } else {
                        e.to_string()
                    };
                    task_job.log.append(LogEvent::error(format!("Job failed: {}", message)));
                    JobResult::Fault { message }
                }
            };

            let state = match result.state() {
                JobState::Failed if task_job.cancel.is_cancelled() => JobState::Cancelled,
                state => state,
            };
            task_job.finish(state, result);
        });

        job
    }

    /// Downloads the requested segments, then optionally packages the channel directory.
    pub async fn submit_fetch(
        &self,
        backend: Arc<dyn SegmentBackend>,
        options: FetchOptions,
        scratch_dir: PathBuf,
        request: FetchJob,
    ) -> Arc<Job> {
        let accepted = vec![
            LogEvent::info(format!(
                "Starting {} download for {}",
                backend.name(),
                request.channel
            )),
            LogEvent::info(format!("Requested segments: {}", request.segments.join(", "))),
        ];

        self.spawn(request.kind, accepted, move |job| async move {
            let summary = fetch_segments(
                backend.as_ref(),
                &request.channel,
                &request.segments,
                &options,
                &job.log,
                &job.cancel,
            )
            .await?;

            let mut package = None;
            if request.package && !summary.cancelled {
                let channel_dir = options.channel_dir(&request.channel);
                let key = request.channel.dir_name();
                let archive_key = key.clone();

                let packaged = tokio::task::spawn_blocking(move || {
                    package_dir(&channel_dir, &scratch_dir, &archive_key)
                })
                .await?;

                match packaged {
                    Ok(_) => {
                        job.log.append(LogEvent::success(format!("Package ready: {}", key)));
                        package = Some(key);
                    }
                    Err(e) => {
                        job.log.append(LogEvent::error(format!("Packaging failed: {}", e)));
                    }
                }
            }

            Ok(JobResult::Fetch { summary, package })
        })
        .await
    }

    /// Rebuilds the channel manifest for the chosen segments and runs Omicron over it.
    pub async fn submit_run(&self, runner: Arc<ProcessRunner>, request: RunJob) -> Arc<Job> {
        let accepted = vec![LogEvent::info(format!(
            "Rebuilding manifest for {} ({} segment(s))",
            request.channel_dir.display(),
            request.segments.len()
        ))];

        self.spawn(JobKind::Omicron, accepted, move |job| async move {
            if !request.channel_dir.is_dir() {
                job.log.append(LogEvent::error(format!(
                    "Channel directory not found: {}",
                    request.channel_dir.display()
                )));
                return Ok(JobResult::Run {
                    outcome: RunOutcome::NotStarted,
                });
            }

            let manifest = Manifest::for_channel_dir(&request.channel_dir, &request.manifest_base);
            let entries = manifest.rebuild(&request.channel_dir, &request.segments).await?;
            job.log.append(LogEvent::info(format!(
                "Manifest {} rebuilt with {} entr{}",
                manifest.path().display(),
                entries.len(),
                if entries.len() == 1 { "y" } else { "ies" }
            )));

            let outcome = runner
                .run(manifest.path(), &request.config_path, &job.log, &job.cancel)
                .await?;

            Ok(JobResult::Run { outcome })
        })
        .await
    }
}
