// Per-job append-only log with wakeups for tailing readers

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// A progress event before it is stamped into a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// An immutable, stamped line of a job log.
#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Destination for progress events produced by fetchers and the runner.
pub trait LogSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    events: Mutex<Vec<LogEvent>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl LogSink for VecSink {
    fn emit(&self, event: LogEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

struct Inner {
    lines: RwLock<Vec<LogLine>>,
    closed: AtomicBool,
    notify: Notify,
}

/// Shared handle to one job's log. Cloning shares the same buffer.
///
/// One writer (the job task) appends; any number of readers tail it by
/// cursor. Closing marks the end of the job so tails can terminate.
#[derive(Clone)]
pub struct JobLog {
    inner: Arc<Inner>,
}

impl JobLog {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                lines: RwLock::new(Vec::new()),
                closed: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn append(&self, event: LogEvent) -> u64 {
        mirror_to_tracing(&event);

        let seq = {
            let mut lines = self.inner.lines.write().unwrap_or_else(|e| e.into_inner());
            let seq = lines.len() as u64;
            lines.push(LogLine {
                seq,
                timestamp: Utc::now(),
                level: event.level,
                message: event.message,
            });
            seq
        };

        self.inner.notify.notify_waiters();
        seq
    }

    pub fn len(&self) -> usize {
        self.inner.lines.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lines from `cursor` onwards.
    pub fn since(&self, cursor: usize) -> Vec<LogLine> {
        let lines = self.inner.lines.read().unwrap_or_else(|e| e.into_inner());
        lines.get(cursor..).map(|s| s.to_vec()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> Vec<LogLine> {
        self.since(0)
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Resolves on the next append or close.
    pub async fn changed(&self) {
        self.inner.notify.notified().await
    }
}

impl Default for JobLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for JobLog {
    fn emit(&self, event: LogEvent) {
        self.append(event);
    }
}

fn mirror_to_tracing(event: &LogEvent) {
    match event.level {
        LogLevel::Debug => debug!("{}", event.message),
        LogLevel::Info | LogLevel::Success => info!("{}", event.message),
        LogLevel::Warning => warn!("{}", event.message),
        LogLevel::Error => error!("{}", event.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_append_and_cursor() {
        let log = JobLog::new();
        assert!(log.is_empty());

        assert_eq!(log.append(LogEvent::info("one")), 0);
        assert_eq!(log.append(LogEvent::error("two")), 1);
        log.emit(LogEvent::success("three"));

        assert_eq!(log.len(), 3);
        let tail = log.since(1);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].seq, 1);
        assert_eq!(tail[0].to_string(), "[ERROR] two");
        assert_eq!(tail[1].level, LogLevel::Success);
        assert!(log.since(3).is_empty());
        assert!(log.since(10).is_empty());
    }

    #[test]
    fn test_clones_share_buffer() {
        let log = JobLog::new();
        let writer = log.clone();
        writer.append(LogEvent::info("shared"));
        assert_eq!(log.len(), 1);
        writer.close();
        assert!(log.is_closed());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(LogEvent::warning("No files").to_string(), "[WARNING] No files");
        assert_eq!(LogLevel::Success.as_str(), "success");
    }

    #[tokio::test]
    async fn test_changed_wakes_on_append() {
        let log = JobLog::new();
        let waiter = log.clone();

        let handle = tokio::spawn(async move {
            tokio::time::timeout(Duration::from_secs(5), waiter.changed())
                .await
                .is_ok()
        });

        // Give the waiter a chance to register before appending.
        tokio::time::sleep(Duration::from_millis(50)).await;
        log.append(LogEvent::info("wake"));

        assert!(handle.await.unwrap());
    }
}
