// Read-only views of the downloaded data tree

use crate::core::constants::{FRAME_EXT, MANIFEST_FILE};
use crate::core::error::Result;
use crate::core::format::{Channel, Segment};
use crate::core::manifest::relative_path;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentListing {
    pub name: String,
    pub files: Vec<FileInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelListing {
    pub name: String,
    /// Directory name, also the package key.
    pub path: String,
    pub manifest: Option<FileInfo>,
    pub segments: Vec<SegmentListing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelRef {
    pub name: String,
    pub path: String,
}

fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut dirs = Vec::new();
    for entry in read_dir {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_info(path: &Path, base: &Path) -> Option<FileInfo> {
    let meta = fs::metadata(path).ok()?;
    meta.is_file().then(|| FileInfo {
        name: file_name(path),
        path: relative_path(path, base),
        size: meta.len(),
    })
}

/// Every channel under `gwf_dir` with its segments, frame files and manifest.
///
/// Paths are reported relative to `base`.
pub fn list_downloads(gwf_dir: &Path, base: &Path) -> Result<Vec<ChannelListing>> {
    let mut channels = Vec::new();

    for ch_dir in sorted_dirs(gwf_dir)? {
        let dir_name = file_name(&ch_dir);
        let mut segments = Vec::new();

        for seg_dir in sorted_dirs(&ch_dir)? {
            let mut files: Vec<FileInfo> = fs::read_dir(&seg_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().and_then(|x| x.to_str()) == Some(FRAME_EXT))
                .filter_map(|p| file_info(&p, base))
                .collect();
            files.sort_by(|a, b| a.name.cmp(&b.name));

            segments.push(SegmentListing {
                name: file_name(&seg_dir),
                files,
            });
        }

        channels.push(ChannelListing {
            name: Channel::from_dir_name(&dir_name).to_string(),
            path: dir_name,
            manifest: file_info(&ch_dir.join(MANIFEST_FILE), base),
            segments,
        });
    }

    Ok(channels)
}

pub fn list_channels(gwf_dir: &Path) -> Result<Vec<ChannelRef>> {
    Ok(sorted_dirs(gwf_dir)?
        .into_iter()
        .map(|d| {
            let dir_name = file_name(&d);
            ChannelRef {
                name: Channel::from_dir_name(&dir_name).to_string(),
                path: dir_name,
            }
        })
        .collect())
}

/// Names of the well-formed segment directories of one channel, in order.
pub fn list_segments(channel_dir: &Path) -> Result<Vec<String>> {
    let mut segments: Vec<Segment> = sorted_dirs(channel_dir)?
        .iter()
        .filter_map(|d| file_name(d).parse().ok())
        .collect();
    segments.sort();
    Ok(segments.iter().map(Segment::to_string).collect())
}
