// gwfetch: detector segment fetching, FFL manifests and Omicron job supervision
// Main library entry point

pub mod core;

// Re-export main types
pub use crate::core::driver::{FetchJob, JobDriver, RunJob};
pub use crate::core::error::{GwError, Result};
pub use crate::core::fetch::{fetch_segments, FetchOptions, FetchSummary, Location, SegmentBackend};
pub use crate::core::format::{Channel, Segment};
pub use crate::core::joblog::{JobLog, LogEvent, LogLevel, LogLine, LogSink};
pub use crate::core::jobs::{CancelResult, Job, JobKind, JobRegistry, JobResult, JobState, JobStatus};
pub use crate::core::manifest::{Manifest, ManifestEntry};
pub use crate::core::nds::{NdsBackend, NdsSettings};
pub use crate::core::omicron::{OmicronSettings, ProcessRunner, RunOutcome};
pub use crate::core::osdf::{OsdfBackend, OsdfSettings};
pub use crate::core::stream::{LogTail, TailItem};
