//! Progress events for in-flight fetches
//!
//! Jobs only ever send; a single consumer owns rendering. Sends never
//! block and a dropped receiver is ignored.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A job began fetching `filename`
    Started { job: String, filename: String },
    /// Expected size. `None` until known; revised at most once to `Some`.
    Total { job: String, bytes: Option<u64> },
    /// Bytes written so far (monotonic)
    Advanced { job: String, written: u64 },
    /// Terminal signal. `skipped` when the file was already present.
    Finished { job: String, skipped: bool },
    Failed { job: String, reason: String },
}

impl ProgressEvent {
    pub fn job(&self) -> &str {
        match self {
            ProgressEvent::Started { job, .. }
            | ProgressEvent::Total { job, .. }
            | ProgressEvent::Advanced { job, .. }
            | ProgressEvent::Finished { job, .. }
            | ProgressEvent::Failed { job, .. } => job,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Finished { .. } | ProgressEvent::Failed { .. }
        )
    }
}

/// Sending half handed to the install pipeline
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Handle for one job's events
    pub fn job(&self, job: impl Into<String>) -> JobProgress {
        JobProgress {
            job: job.into(),
            tx: self.tx.clone(),
        }
    }
}

/// Per-job progress handle
#[derive(Debug, Clone)]
pub struct JobProgress {
    job: String,
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl JobProgress {
    fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn started(&self, filename: &str) {
        self.send(ProgressEvent::Started {
            job: self.job.clone(),
            filename: filename.to_string(),
        });
    }

    pub fn total(&self, bytes: Option<u64>) {
        self.send(ProgressEvent::Total {
            job: self.job.clone(),
            bytes,
        });
    }

    pub fn advanced(&self, written: u64) {
        self.send(ProgressEvent::Advanced {
            job: self.job.clone(),
            written,
        });
    }

    pub fn finished(&self, skipped: bool) {
        self.send(ProgressEvent::Finished {
            job: self.job.clone(),
            skipped,
        });
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.send(ProgressEvent::Failed {
            job: self.job.clone(),
            reason: reason.into(),
        });
    }
}
