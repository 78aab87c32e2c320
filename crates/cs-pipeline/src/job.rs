//! Job model: requests, lifecycle states, outcomes and the caller's handle.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cs_av::BackendKind;
use cs_core::{Error, JobResult};

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Lifecycle of a single job.
///
/// ```text
/// Idle -> Probing -> Deciding -> Skipped  -> Finalizing -> Completed
///                             -> Encoding -> Finalizing -> Completed
/// ```
///
/// Any non-terminal state may end in `Failed` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Probing,
    Deciding,
    Skipped,
    Encoding,
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Probing => "probing",
            Self::Deciding => "deciding",
            Self::Skipped => "skipped",
            Self::Encoding => "encoding",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Failed | Cancelled) {
            return true;
        }
        matches!(
            (self, next),
            (Idle, Probing)
                | (Probing, Deciding)
                | (Deciding, Skipped)
                | (Deciding, Encoding)
                | (Skipped, Finalizing)
                | (Encoding, Finalizing)
                | (Finalizing, Completed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Where the source bytes come from. The orchestrator copies them into a
/// private temp file before anything else, so a reader is consumed exactly
/// once.
pub enum JobSource {
    Path(PathBuf),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl fmt::Debug for JobSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

#[derive(Debug)]
pub struct JobRequest {
    pub source: JobSource,
    pub backend: BackendKind,
}

impl JobRequest {
    pub fn from_path(path: impl Into<PathBuf>, backend: BackendKind) -> Self {
        Self {
            source: JobSource::Path(path.into()),
            backend,
        }
    }

    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static, backend: BackendKind) -> Self {
        Self {
            source: JobSource::Reader(Box::new(reader)),
            backend,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome / report
// ---------------------------------------------------------------------------

/// Terminal outcome of a job. Cancellation is its own variant, not an error.
#[derive(Debug)]
pub enum JobOutcome {
    Completed(JobResult),
    Failed(Error),
    Cancelled,
}

impl JobOutcome {
    /// Human-readable status line for the UI.
    pub fn status(&self) -> String {
        match self {
            Self::Completed(_) => "completed".to_string(),
            Self::Cancelled => "cancelled".to_string(),
            Self::Failed(e) => format!("failed ({}): {e}", e.classification()),
        }
    }

    /// The terminal [`JobState`] this outcome corresponds to.
    pub fn state(&self) -> JobState {
        match self {
            Self::Completed(_) => JobState::Completed,
            Self::Failed(_) => JobState::Failed,
            Self::Cancelled => JobState::Cancelled,
        }
    }

    pub fn result(&self) -> Option<&JobResult> {
        match self {
            Self::Completed(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Everything the caller learns about a finished job.
#[derive(Debug)]
pub struct JobReport {
    pub job_id: u64,
    pub outcome: JobOutcome,
    /// Every state the job entered, in order, starting with `Idle`.
    pub transitions: Vec<JobState>,
}

impl JobReport {
    /// Whether the job passed through `state`.
    pub fn reached(&self, state: JobState) -> bool {
        self.transitions.contains(&state)
    }
}

// ---------------------------------------------------------------------------
// State tracking
// ---------------------------------------------------------------------------

/// Records transitions and publishes the current state.
#[derive(Debug)]
pub(crate) struct StateTracker {
    job_id: u64,
    tx: watch::Sender<JobState>,
    transitions: Vec<JobState>,
}

impl StateTracker {
    pub(crate) fn new(job_id: u64, tx: watch::Sender<JobState>) -> Self {
        tx.send_replace(JobState::Idle);
        Self {
            job_id,
            tx,
            transitions: vec![JobState::Idle],
        }
    }

    pub(crate) fn current(&self) -> JobState {
        self.transitions.last().copied().unwrap_or(JobState::Idle)
    }

    pub(crate) fn enter(&mut self, next: JobState) {
        let current = self.current();
        if !current.can_transition_to(next) {
            tracing::warn!(job_id = self.job_id, from = %current, to = %next, "unexpected state transition");
        }
        tracing::debug!(job_id = self.job_id, from = %current, to = %next, "state transition");
        self.transitions.push(next);
        self.tx.send_replace(next);
    }

    pub(crate) fn into_transitions(self) -> Vec<JobState> {
        self.transitions
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Caller-side handle for a job running in the background.
#[derive(Debug)]
pub struct JobHandle {
    pub(crate) job_id: u64,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: watch::Receiver<JobState>,
    pub(crate) task: JoinHandle<JobReport>,
}

impl JobHandle {
    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// Request cancellation. The job still runs its cleanup and resolves to
    /// [`JobOutcome::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Receiver that observes every published state change.
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }

    /// Wait for the job to reach a terminal state.
    pub async fn wait(self) -> JobReport {
        let last = *self.state.borrow();
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                let outcome = if e.is_cancelled() {
                    JobOutcome::Cancelled
                } else {
                    JobOutcome::Failed(Error::backend("orchestrator", format!("job task failed: {e}")))
                };
                JobReport {
                    job_id: self.job_id,
                    transitions: vec![last, outcome.state()],
                    outcome,
                }
            }
        }
    }
}
