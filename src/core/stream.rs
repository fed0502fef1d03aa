// Cursor-based tailing of a job log

use crate::core::constants::DEFAULT_POLL_INTERVAL;
use crate::core::joblog::LogLine;
use crate::core::jobs::{Job, JobStatus};
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum TailItem {
    /// Lines appended since the previous item, in order.
    Lines(Vec<LogLine>),
    /// The job finished and every line has been delivered.
    End(JobStatus),
}

/// One reader's position in a job log.
pub struct LogTail {
    job: Arc<Job>,
    cursor: usize,
    poll_interval: Duration,
    ended: bool,
}

impl LogTail {
    pub fn new(job: Arc<Job>) -> Self {
        Self::with_poll_interval(job, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(job: Arc<Job>, poll_interval: Duration) -> Self {
        Self {
            job,
            cursor: 0,
            poll_interval,
            ended: false,
        }
    }

    /// Starts after the first `cursor` lines, e.g. when resuming.
    pub fn from_cursor(mut self, cursor: usize) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Waits for new lines, or for the end of the job once everything has been read.
    ///
    /// Returns `None` after the `End` item has been handed out.
    pub async fn next_item(&mut self) -> Option<TailItem> {
        if self.ended {
            return None;
        }

        loop {
            // Closed is read before the lines: a closed log gets no more appends.
            let closed = self.job.log.is_closed();
            let lines = self.job.log.since(self.cursor);

            if !lines.is_empty() {
                self.cursor += lines.len();
                return Some(TailItem::Lines(lines));
            }
            if closed {
                self.ended = true;
                return Some(TailItem::End(self.job.status()));
            }

            let _ = tokio::time::timeout(self.poll_interval, self.job.log.changed()).await;
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = TailItem> + Send {
        futures::stream::unfold(self, |mut tail| async move {
            tail.next_item().await.map(|item| (item, tail))
        })
    }
}
