// Frame-file-list (FFL) manifest: one `path start duration 0 0` line per frame file

use crate::core::constants::*;
use crate::core::error::{GwError, Result};
use crate::core::format::Segment;
use serde::Serialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub path: String,
    pub start: i64,
    pub duration: i64,
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.path, self.start, self.duration, MANIFEST_FLAGS
        )
    }
}

impl FromStr for ManifestEntry {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(format!("expected at least 3 fields, got {}", fields.len()));
        }
        let start = fields[1]
            .parse()
            .map_err(|_| format!("bad start time {:?}", fields[1]))?;
        let duration = fields[2]
            .parse()
            .map_err(|_| format!("bad duration {:?}", fields[2]))?;
        Ok(Self {
            path: fields[0].to_string(),
            start,
            duration,
        })
    }
}

/// A manifest file whose entries are written relative to `base`.
///
/// Keeping paths relative to a shared base lets any working directory
/// under that base consume the same manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    base: PathBuf,
}

impl Manifest {
    pub fn new(path: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            base: base.into(),
        }
    }

    /// The manifest shared by all segments of one channel directory.
    pub fn for_channel_dir(channel_dir: &Path, base: impl Into<PathBuf>) -> Self {
        Self::new(channel_dir.join(MANIFEST_FILE), base)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry for `file` relative to this manifest's base.
    pub fn entry_for(&self, file: &Path, start: i64, duration: i64) -> ManifestEntry {
        ManifestEntry {
            path: relative_path(file, &self.base),
            start,
            duration,
        }
    }

    /// Appends a single line. The file is created if missing and never truncated.
    pub async fn append(&self, entry: &ManifestEntry) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\n", entry).as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn append_file(&self, file: &Path, start: i64, duration: i64) -> Result<ManifestEntry> {
        let entry = self.entry_for(file, start, duration);
        self.append(&entry).await?;
        Ok(entry)
    }

    /// Rewrites the manifest from frame files already on disk.
    ///
    /// For each segment name the first `*.gwf` (by name) in
    /// `channel_dir/<segment>` is listed with the segment's own start and
    /// length. Segments without data, or whose name does not parse, are skipped.
    pub async fn rebuild<S: AsRef<str>>(
        &self,
        channel_dir: &Path,
        segments: &[S],
    ) -> Result<Vec<ManifestEntry>> {
        let mut entries = Vec::new();

        for name in segments {
            let name = name.as_ref().trim();
            let segment: Segment = match name.parse() {
                Ok(s) => s,
                Err(e) => {
                    debug!("Skipping segment {:?} during rebuild: {}", name, e);
                    continue;
                }
            };

            let seg_dir = channel_dir.join(name);
            let Some(frame) = first_frame_file(&seg_dir).await? else {
                debug!("No frame files in {}", seg_dir.display());
                continue;
            };

            entries.push(self.entry_for(&frame, segment.start, segment.duration()));
        }

        let body: String = entries.iter().map(|e| format!("{}\n", e)).collect();
        fs::write(&self.path, body).await?;

        Ok(entries)
    }

    /// Reads every non-blank line, failing on the first malformed one.
    pub async fn read_entries(&self) -> Result<Vec<ManifestEntry>> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GwError::ManifestNotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        data.lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| {
                l.parse()
                    .map_err(|reason| GwError::InvalidManifest { line: i + 1, reason })
            })
            .collect()
    }

    pub async fn line_count(&self) -> Result<usize> {
        match fs::read_to_string(&self.path).await {
            Ok(d) => Ok(d.lines().filter(|l| !l.trim().is_empty()).count()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

async fn first_frame_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut read_dir = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut frames = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(FRAME_EXT) && path.is_file() {
            frames.push(path);
        }
    }
    frames.sort();

    Ok(frames.into_iter().next())
}

/// `./`-prefixed, `/`-separated path of `file` under `base`.
///
/// Falls back to the file's own path when it is not under `base`.
pub fn relative_path(file: &Path, base: &Path) -> String {
    let rel = file.strip_prefix(base).unwrap_or(file);

    let parts: Vec<String> = rel
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    if rel.is_absolute() {
        rel.to_string_lossy().replace('\\', "/")
    } else {
        format!("./{}", parts.join("/"))
    }
}
