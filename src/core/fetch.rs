// Segment-by-segment download loop shared by every backend

use crate::core::constants::*;
use crate::core::error::{GwError, Result};
use crate::core::format::{is_plain_file_name, parse_frame_name, Channel, Segment};
use crate::core::joblog::{LogEvent, LogSink};
use crate::core::manifest::Manifest;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One retrievable file covering part of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// URL (or backend specific address) of the content.
    pub source: String,
    /// Local file name inside the segment directory.
    pub file_name: String,
    /// `(gps start, duration)` when the backend knows it up front.
    pub span: Option<(i64, i64)>,
}

impl Location {
    /// Location whose file name is the last path component of `url`.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            source: url.to_string(),
            file_name,
            span: None,
        }
    }
}

/// Retrieval capabilities of a data backend.
#[async_trait]
pub trait SegmentBackend: Send + Sync {
    /// Short label used in progress messages.
    fn name(&self) -> &str;

    /// Files covering `[segment.start, segment.end)` for `channel`.
    async fn resolve_locations(&self, channel: &Channel, segment: &Segment) -> Result<Vec<Location>>;

    /// Writes the content of `location` to `dest`, returning the byte count.
    async fn retrieve(&self, location: &Location, dest: &Path) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Root holding one directory per channel.
    pub output_root: PathBuf,
    /// Manifest paths are written relative to this directory.
    pub manifest_base: PathBuf,
    /// Pause after each successful download.
    pub courtesy_delay: Duration,
}

impl FetchOptions {
    pub fn new(output_root: impl Into<PathBuf>, manifest_base: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            manifest_base: manifest_base.into(),
            courtesy_delay: DEFAULT_COURTESY_DELAY,
        }
    }

    pub fn with_courtesy_delay(mut self, delay: Duration) -> Self {
        self.courtesy_delay = delay;
        self
    }

    pub fn channel_dir(&self, channel: &Channel) -> PathBuf {
        self.output_root.join(channel.dir_name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub invalid_segments: usize,
    pub cancelled: bool,
}

/// Fetches every segment for `channel`, feeding `sink` as it goes.
///
/// Segments and files are independent: a bad segment string, a failed
/// lookup or a failed download is reported and the loop moves on. Files
/// already present in the segment directory are neither downloaded nor
/// added to the manifest again. Only a channel that cannot map to a
/// directory under the root and local I/O faults (creating directories,
/// writing the manifest) end the batch early with `Err`.
pub async fn fetch_segments(
    backend: &dyn SegmentBackend,
    channel: &Channel,
    segments: &[String],
    options: &FetchOptions,
    sink: &dyn LogSink,
    cancel: &CancellationToken,
) -> Result<FetchSummary> {
    channel.validate()?;
    let channel_dir = options.channel_dir(channel);
    fs::create_dir_all(&channel_dir).await?;
    let manifest = Manifest::for_channel_dir(&channel_dir, &options.manifest_base);

    let mut summary = FetchSummary::default();

    'segments: for raw in segments {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let segment: Segment = match raw.parse() {
            Ok(s) => s,
            Err(_) => {
                sink.emit(LogEvent::error(format!("Invalid segment: {}", raw)));
                summary.invalid_segments += 1;
                continue;
            }
        };

        let segment_dir = channel_dir.join(segment.dir_name());
        fs::create_dir_all(&segment_dir).await?;

        sink.emit(LogEvent::info(format!(
            "Finding files for {} {}-{}...",
            channel, segment.start, segment.end
        )));

        let locations = match backend.resolve_locations(channel, &segment).await {
            Ok(l) => l,
            Err(e) => {
                sink.emit(LogEvent::error(format!("Location lookup failed {}: {}", segment, e)));
                continue;
            }
        };

        if locations.is_empty() {
            sink.emit(LogEvent::warning(format!("No files found for {}", segment)));
            continue;
        }

        sink.emit(LogEvent::info(format!(
            "Found {} file(s) for {}",
            locations.len(),
            segment
        )));

        for location in &locations {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break 'segments;
            }

            if !is_plain_file_name(&location.file_name) {
                sink.emit(LogEvent::error(format!(
                    "Refusing file name from {}: {:?}",
                    backend.name(),
                    location.file_name
                )));
                summary.failed += 1;
                continue;
            }

            let file_path = segment_dir.join(&location.file_name);
            if fs::try_exists(&file_path).await.unwrap_or(false) {
                sink.emit(LogEvent::info(format!("Already exists: {}", location.file_name)));
                summary.skipped += 1;
                continue;
            }

            sink.emit(LogEvent::info(format!("Downloading {}...", location.file_name)));

            let bytes = match download(backend, location, &file_path).await {
                Ok(b) => b,
                Err(e) => {
                    sink.emit(LogEvent::error(format!(
                        "Download failed {}: {}",
                        location.file_name, e
                    )));
                    summary.failed += 1;
                    continue;
                }
            };
            debug!("Wrote {} bytes to {}", bytes, file_path.display());

            let (start, duration) = match location.span {
                Some(span) => span,
                None => match parse_frame_name(&location.file_name) {
                    Ok(span) => span,
                    Err(e) => {
                        sink.emit(LogEvent::warning(format!(
                            "{}; using segment bounds for the manifest",
                            e
                        )));
                        (segment.start, segment.duration())
                    }
                },
            };

            manifest.append_file(&file_path, start, duration).await?;
            summary.downloaded += 1;
            sink.emit(LogEvent::success(format!("Saved {}", location.file_name)));

            if !options.courtesy_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(options.courtesy_delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }
    }

    if summary.cancelled {
        sink.emit(LogEvent::warning(format!(
            "{} cancelled – {} file(s) downloaded before cancellation",
            backend.name(),
            summary.downloaded
        )));
    } else {
        sink.emit(LogEvent::success(format!(
            "{} complete – {} file(s) downloaded",
            backend.name(),
            summary.downloaded
        )));
    }

    Ok(summary)
}

/// Retrieves into `<dest>.part`, then renames into place.
async fn download(backend: &dyn SegmentBackend, location: &Location, dest: &Path) -> Result<u64> {
    let mut partial = dest.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    let partial = PathBuf::from(partial);

    let result = async {
        let bytes = backend.retrieve(location, &partial).await?;
        fs::rename(&partial, dest).await?;
        Ok::<u64, GwError>(bytes)
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&partial).await;
    }
    result
}

/// Streams a successful HTTP response body into `dest`.
pub(crate) async fn write_response(response: reqwest::Response, dest: &Path) -> Result<u64> {
    let response = response.error_for_status()?;

    let mut file = fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}
