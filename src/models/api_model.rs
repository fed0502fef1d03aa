use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

fn default_package() -> bool {
    true
}

#[derive(Deserialize, Debug)]
pub struct OsdfRequest {
    pub detector: String,
    pub frametype: String,
    pub segments: Vec<String>,
    #[serde(default = "default_package")]
    pub package: bool,
}

#[derive(Deserialize, Debug)]
pub struct NdsRequest {
    pub channel: String,
    pub segments: Vec<String>,
    #[serde(default = "default_package")]
    pub package: bool,
}

#[derive(Deserialize, Debug)]
pub struct OmicronRequest {
    /// Channel directory name under the download root.
    pub channel_dir: String,
    pub segments: Vec<String>,
    pub config_path: Option<PathBuf>,
}

#[derive(Serialize, Debug)]
pub struct JobAccepted {
    pub status: &'static str,
    pub job_id: Uuid,
}

impl JobAccepted {
    pub fn started(job_id: Uuid) -> Self {
        Self {
            status: "started",
            job_id,
        }
    }
}

/// Omicron configuration file contents.
#[derive(Deserialize, Serialize, Debug)]
pub struct ConfigContent {
    pub content: String,
}

#[derive(Deserialize, Debug)]
pub struct SegmentsQuery {
    pub dir: String,
}
