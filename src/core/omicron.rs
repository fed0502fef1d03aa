// Omicron supervision: span from the manifest, launch, relay output live, report exit

use crate::core::constants::OMICRON_LOG_FILE;
use crate::core::error::{GwError, Result};
use crate::core::joblog::{LogEvent, LogLevel, LogSink};
use crate::core::manifest::{Manifest, ManifestEntry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OmicronSettings {
    /// Binary name or path.
    pub binary: String,
    /// Optional wrapper the binary is run through, e.g. `["wsl", "--"]`.
    pub launcher: Vec<String>,
    /// Where Omicron writes its triggers; also receives `omicron.out`.
    pub output_dir: PathBuf,
    /// Working directory of the child; inherited when unset.
    pub working_dir: Option<PathBuf>,
    /// Default configuration file passed as third argument.
    pub config_path: PathBuf,
}

impl Default for OmicronSettings {
    fn default() -> Self {
        Self {
            binary: "omicron".to_string(),
            launcher: Vec::new(),
            output_dir: PathBuf::from("./uploads/OmicronOut"),
            working_dir: None,
            config_path: PathBuf::from("config.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Preconditions failed; nothing was launched.
    NotStarted,
    Succeeded,
    Failed { code: Option<i32> },
    Cancelled,
}

/// Next newline-terminated chunk of `reader`, decoded lossily; `None` at end of stream.
///
/// Bytes of a read interrupted by `select!` stay in `buf` and are picked up by the next call.
async fn read_raw_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let n = reader.read_until(b'\n', buf).await?;
    if n == 0 && buf.is_empty() {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf).into_owned();
    buf.clear();
    Ok(Some(line))
}

/// Processing span `(first entry start, last entry start)`.
///
/// Taken from line order, not from the numeric minimum and maximum, so
/// an unsorted manifest yields whatever its first and last lines say.
pub fn manifest_span(entries: &[ManifestEntry]) -> Option<(i64, i64)> {
    Some((entries.first()?.start, entries.last()?.start))
}

pub struct ProcessRunner {
    settings: OmicronSettings,
}

impl ProcessRunner {
    pub fn new(settings: OmicronSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &OmicronSettings {
        &self.settings
    }

    fn command(&self, start: i64, end: i64, config_path: &Path) -> Command {
        let mut cmd = match self.settings.launcher.split_first() {
            Some((program, rest)) => {
                let mut cmd = Command::new(program);
                cmd.args(rest).arg(&self.settings.binary);
                cmd
            }
            None => Command::new(&self.settings.binary),
        };

        cmd.arg(start.to_string())
            .arg(end.to_string())
            .arg(config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.settings.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Runs Omicron over the span of `manifest_path`, relaying its output to `sink`.
    ///
    /// A missing or empty manifest produces a single error event and no
    /// process. stdout lines are relayed at info level and stderr lines at
    /// warning level, in the order they arrive; every line is also written
    /// to `omicron.out` in the output directory.
    pub async fn run(
        &self,
        manifest_path: &Path,
        config_path: &Path,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let manifest = Manifest::new(manifest_path, "");
        let entries = match manifest.read_entries().await {
            Ok(e) => e,
            Err(GwError::ManifestNotFound(path)) => {
                sink.emit(LogEvent::error(format!(".ffl file not found: {}", path)));
                return Ok(RunOutcome::NotStarted);
            }
            Err(e @ GwError::InvalidManifest { .. }) => {
                sink.emit(LogEvent::error(format!("Unreadable .ffl: {}", e)));
                return Ok(RunOutcome::NotStarted);
            }
            Err(e) => return Err(e),
        };

        let Some((start, end)) = manifest_span(&entries) else {
            sink.emit(LogEvent::error(format!("Empty .ffl: {}", manifest_path.display())));
            return Ok(RunOutcome::NotStarted);
        };
        if end < start {
            warn!("Manifest {} is not chronological ({} > {})", manifest_path.display(), start, end);
        }

        fs::create_dir_all(&self.settings.output_dir).await?;
        let mut tee = fs::File::create(self.settings.output_dir.join(OMICRON_LOG_FILE)).await?;

        sink.emit(LogEvent::info(format!("Starting OMICRON over {}-{}...", start, end)));

        let mut child = match self.command(start, end, config_path).spawn() {
            Ok(c) => c,
            Err(e) => {
                sink.emit(LogEvent::error(format!(
                    "OMICRON could not be launched ({}): {}",
                    self.settings.binary, e
                )));
                return Ok(RunOutcome::Failed { code: None });
            }
        };
        info!("OMICRON started (pid {:?})", child.id());

        let stdout = child.stdout.take().ok_or_else(|| GwError::Remote("stdout not captured".into()))?;
        let stderr = child.stderr.take().ok_or_else(|| GwError::Remote("stderr not captured".into()))?;
        let mut out_reader = BufReader::new(stdout);
        let mut err_reader = BufReader::new(stderr);
        let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
        let (mut out_done, mut err_done) = (false, false);

        while !(out_done && err_done) {
            let (line, level) = tokio::select! {
                line = read_raw_line(&mut out_reader, &mut out_buf), if !out_done => (line, LogLevel::Info),
                line = read_raw_line(&mut err_reader, &mut err_buf), if !err_done => (line, LogLevel::Warning),
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    sink.emit(LogEvent::warning("OMICRON cancelled"));
                    return Ok(RunOutcome::Cancelled);
                }
            };

            match line {
                Ok(Some(text)) => {
                    let text = text.trim_end();
                    if text.is_empty() {
                        continue;
                    }
                    tee.write_all(format!("{}\n", text).as_bytes()).await?;
                    sink.emit(LogEvent::new(level, text));
                }
                Ok(None) => {
                    if level == LogLevel::Info {
                        out_done = true;
                    } else {
                        err_done = true;
                    }
                }
                Err(e) => {
                    // An unread pipe would block the child forever.
                    sink.emit(LogEvent::error(format!("OMICRON output unreadable: {}", e)));
                    let _ = child.kill().await;
                    out_done = true;
                    err_done = true;
                }
            }
        }
        tee.flush().await?;

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                sink.emit(LogEvent::warning("OMICRON cancelled"));
                return Ok(RunOutcome::Cancelled);
            }
        };

        match status.code() {
            Some(0) => {
                sink.emit(LogEvent::success(format!(
                    "OMICRON finished – results in {}",
                    self.settings.output_dir.display()
                )));
                Ok(RunOutcome::Succeeded)
            }
            Some(code) => {
                sink.emit(LogEvent::error(format!("OMICRON failed (code {})", code)));
                Ok(RunOutcome::Failed { code: Some(code) })
            }
            None => {
                sink.emit(LogEvent::error("OMICRON terminated by a signal"));
                Ok(RunOutcome::Failed { code: None })
            }
        }
    }
}
