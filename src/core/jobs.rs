// In-memory job records and their registry

use crate::core::constants::DEFAULT_JOB_RETENTION;
use crate::core::fetch::FetchSummary;
use crate::core::joblog::JobLog;
use crate::core::omicron::RunOutcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Osdf,
    Nds,
    Omicron,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

/// Structured terminal result of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobResult {
    Fetch {
        summary: FetchSummary,
        package: Option<String>,
    },
    Run {
        outcome: RunOutcome,
    },
    Fault {
        message: String,
    },
}

impl JobResult {
    pub fn state(&self) -> JobState {
        match self {
            JobResult::Fetch { summary, .. } if summary.cancelled => JobState::Cancelled,
            JobResult::Fetch { .. } => JobState::Succeeded,
            JobResult::Run { outcome } => match outcome {
                RunOutcome::Succeeded => JobState::Succeeded,
                RunOutcome::Cancelled => JobState::Cancelled,
                RunOutcome::NotStarted | RunOutcome::Failed { .. } => JobState::Failed,
            },
            JobResult::Fault { .. } => JobState::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: Uuid,
    pub kind: JobKind,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub lines: usize,
    pub result: Option<JobResult>,
}

struct Progress {
    state: JobState,
    finished_at: Option<DateTime<Utc>>,
    result: Option<JobResult>,
}

pub struct Job {
    pub id: Uuid,
    /// Creation order within the registry.
    pub seq: u64,
    pub kind: JobKind,
    pub created_at: DateTime<Utc>,
    pub log: JobLog,
    pub cancel: CancellationToken,
    progress: Mutex<Progress>,
}

impl Job {
    fn new(kind: JobKind, seq: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq,
            kind,
            created_at: Utc::now(),
            log: JobLog::new(),
            cancel: CancellationToken::new(),
            progress: Mutex::new(Progress {
                state: JobState::Running,
                finished_at: None,
                result: None,
            }),
        }
    }

    pub fn state(&self) -> JobState {
        self.progress.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    pub fn status(&self) -> JobStatus {
        let progress = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        JobStatus {
            id: self.id,
            kind: self.kind,
            state: progress.state,
            created_at: self.created_at,
            finished_at: progress.finished_at,
            lines: self.log.len(),
            result: progress.result.clone(),
        }
    }

    /// Records the terminal state, then closes the log so tails can end.
    pub fn finish(&self, state: JobState, result: JobResult) {
        {
            let mut progress = self.progress.lock().unwrap_or_else(|e| e.into_inner());
            if progress.state.is_finished() {
                return;
            }
            progress.state = state;
            progress.finished_at = Some(Utc::now());
            progress.result = Some(result);
        }
        info!("Job {} ({:?}) finished: {:?}", self.id, self.kind, state);
        self.log.close();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelResult {
    Requested,
    NotFound,
    AlreadyFinished,
}

/// Jobs keyed by id. Cloning shares the same registry.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, Arc<Job>>>>,
    next_seq: Arc<AtomicU64>,
    retention: usize,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_JOB_RETENTION)
    }

    /// Keeps at most `retention` finished jobs; running jobs are never pruned.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            next_seq: Arc::new(AtomicU64::new(0)),
            retention,
        }
    }

    pub async fn create(&self, kind: JobKind) -> Arc<Job> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let job = Arc::new(Job::new(kind, seq));
        let mut jobs = self.jobs.write().await;
        Self::prune(&mut jobs, self.retention);
        jobs.insert(job.id, job.clone());
        debug!("Registered job {} ({:?})", job.id, kind);
        job
    }

    fn prune(jobs: &mut HashMap<Uuid, Arc<Job>>, retention: usize) {
        let mut finished: Vec<(u64, Uuid)> = jobs
            .values()
            .filter(|j| j.state().is_finished())
            .map(|j| (j.seq, j.id))
            .collect();

        if finished.len() <= retention {
            return;
        }
        finished.sort();
        let excess = finished.len() - retention;
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<Job>> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Status of every known job, oldest first.
    pub async fn list(&self) -> Vec<JobStatus> {
        let mut jobs: Vec<Arc<Job>> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.seq);
        jobs.iter().map(|j| j.status()).collect()
    }

    pub async fn cancel(&self, id: &Uuid) -> CancelResult {
        match self.get(id).await {
            None => CancelResult::NotFound,
            Some(job) if job.state().is_finished() => CancelResult::AlreadyFinished,
            Some(job) => {
                info!("Cancellation requested for job {}", id);
                job.cancel.cancel();
                CancelResult::Requested
            }
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
