// Channel directory archives (tar + gzip) kept in a scratch directory by key

use crate::core::constants::PARTIAL_SUFFIX;
use crate::core::error::{GwError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ARCHIVE_EXT: &str = "tar.gz";

/// Keys are single path components; anything that could escape the scratch directory is refused.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\']) {
        return Err(GwError::Archive(format!("invalid package key {:?}", key)));
    }
    Ok(())
}

pub fn archive_path(scratch_dir: &Path, key: &str) -> PathBuf {
    scratch_dir.join(format!("{}.{}", key, ARCHIVE_EXT))
}

/// Archives `src_dir` as `<scratch_dir>/<key>.tar.gz`, entries rooted at `<key>/`.
///
/// Written under a temporary name and renamed, so a reader never sees a
/// half-written archive.
pub fn package_dir(src_dir: &Path, scratch_dir: &Path, key: &str) -> Result<PathBuf> {
    validate_key(key)?;
    if !src_dir.is_dir() {
        return Err(GwError::Archive(format!(
            "directory not found: {}",
            src_dir.display()
        )));
    }

    fs::create_dir_all(scratch_dir)?;
    let dest = archive_path(scratch_dir, key);
    let partial = scratch_dir.join(format!("{}.{}{}", key, ARCHIVE_EXT, PARTIAL_SUFFIX));

    let file = File::create(&partial)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    let result = builder
        .append_dir_all(key, src_dir)
        .and_then(|_| builder.into_inner())
        .and_then(|encoder| encoder.finish())
        .and_then(|_| fs::rename(&partial, &dest));

    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(GwError::Archive(format!("failed to archive {}: {}", src_dir.display(), e)));
    }

    debug!("Packaged {} into {}", src_dir.display(), dest.display());
    Ok(dest)
}

/// Path of a finished, non-empty archive for `key`.
pub fn find_package(scratch_dir: &Path, key: &str) -> Option<PathBuf> {
    validate_key(key).ok()?;
    let path = archive_path(scratch_dir, key);
    match fs::metadata(&path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some(path),
        _ => None,
    }
}
