//! The `Transcode` capability and its three backend variants.
//!
//! Every backend receives a [`BackendJob`] and a cancellation token and
//! resolves to a [`BackendOutput`] or an error. The orchestrator never looks
//! past this contract: engine threads, callbacks and scratch directories are
//! details of the individual adapters.

pub mod compressor;
pub mod ffmpeg;
pub mod strategy;
pub mod transform;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cs_core::{BackendProfile, EncodingTargets, Error, MediaMetadata, ProgressReporter};

use crate::workspace::remove_if_exists;

// ---------------------------------------------------------------------------
// BackendKind
// ---------------------------------------------------------------------------

/// Caller-facing identifier selecting a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Transform,
    Strategy,
    Compressor,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Transform, Self::Strategy, Self::Compressor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Strategy => "strategy",
            Self::Compressor => "compressor",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transform" => Ok(Self::Transform),
            "strategy" => Ok(Self::Strategy),
            "compressor" => Ok(Self::Compressor),
            other => Err(Error::Config(format!("unknown backend: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Job / output
// ---------------------------------------------------------------------------

/// Everything a backend needs to encode one file.
#[derive(Debug, Clone)]
pub struct BackendJob {
    pub source: PathBuf,
    /// Where the caller expects the output. Backends that pick their own
    /// output location still remove this path on failure.
    pub destination: PathBuf,
    pub targets: EncodingTargets,
    pub source_info: MediaMetadata,
    pub progress: ProgressReporter,
}

/// Successful completion of a backend.
#[derive(Debug)]
pub enum BackendOutput {
    /// A new file was written at `path`. `scratch`, if present, holds the
    /// directory the engine wrote into and is deleted when dropped.
    Encoded {
        path: PathBuf,
        scratch: Option<TempDir>,
    },
    /// The engine decided on its own that no transcode was necessary. The
    /// destination has already been removed.
    NotNeeded,
}

/// A transcoding engine reachable through a single capability.
#[async_trait]
pub trait Transcode: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Fixed tuning applied to every job.
    fn profile(&self) -> &BackendProfile;

    /// Encode `job.source` and resolve once the engine reached a terminal
    /// state.
    ///
    /// Implementations must delete `job.destination` before returning an
    /// error, and must return [`Error::Cancelled`] (never a generic failure)
    /// when `cancel` fired.
    async fn transcode(
        &self,
        job: BackendJob,
        cancel: CancellationToken,
    ) -> cs_core::Result<BackendOutput>;
}

impl fmt::Debug for dyn Transcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcode").field("name", &self.name()).finish()
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A running backend invocation.
#[derive(Debug)]
pub struct TranscodeHandle {
    backend: &'static str,
    cancel: CancellationToken,
    task: JoinHandle<cs_core::Result<BackendOutput>>,
}

/// Start `backend` on a background task. The backend observes a child of
/// `parent`, so cancelling the job cancels the backend.
pub fn start(
    backend: Arc<dyn Transcode>,
    job: BackendJob,
    parent: &CancellationToken,
) -> TranscodeHandle {
    let cancel = parent.child_token();
    let token = cancel.clone();
    let name = backend.name();

    tracing::debug!(backend = name, source = %job.source.display(), "starting backend");
    let task = tokio::spawn(async move { backend.transcode(job, token).await });

    TranscodeHandle {
        backend: name,
        cancel,
        task,
    }
}

impl TranscodeHandle {
    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Ask the backend to stop. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Await the backend's result without consuming the handle.
    pub async fn join(&mut self) -> cs_core::Result<BackendOutput> {
        let joined = (&mut self.task).await;
        flatten(self.backend, joined)
    }

    /// Await the backend's result.
    pub async fn wait(mut self) -> cs_core::Result<BackendOutput> {
        self.join().await
    }

    /// Cancel and give the backend `grace` to wind down. A backend that does
    /// not honour the token in time is aborted and reported as cancelled.
    pub async fn stop(mut self, grace: Duration) -> cs_core::Result<BackendOutput> {
        self.cancel.cancel();
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(joined) => flatten(self.backend, joined),
            Err(_) => {
                tracing::warn!(backend = self.backend, ?grace, "backend ignored cancellation; aborting task");
                self.task.abort();
                Err(Error::Cancelled)
            }
        }
    }
}

fn flatten(
    backend: &str,
    joined: Result<cs_core::Result<BackendOutput>, tokio::task::JoinError>,
) -> cs_core::Result<BackendOutput> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(Error::Cancelled),
        Err(e) => Err(Error::backend(backend, format!("backend task failed: {e}"))),
    }
}

// ---------------------------------------------------------------------------
// Shared adapter helpers
// ---------------------------------------------------------------------------

/// Common exit path for every adapter: on error the partially written
/// destination is removed and tool failures are attributed to `engine`.
pub(crate) fn settle(
    engine: &'static str,
    destination: &Path,
    result: cs_core::Result<BackendOutput>,
) -> cs_core::Result<BackendOutput> {
    match result {
        Ok(output) => Ok(output),
        Err(e) => {
            remove_if_exists(destination);
            if e.is_cancelled() {
                tracing::info!(backend = engine, "backend cancelled");
            } else {
                tracing::debug!(backend = engine, error = %e, "backend failed");
            }
            Err(e.into_backend(engine))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn kind_parses_and_prints() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.as_str().parse::<BackendKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.as_str());
        }
        assert_eq!(" Strategy ".parse::<BackendKind>().unwrap(), BackendKind::Strategy);
        assert_matches!("h265".parse::<BackendKind>(), Err(Error::Config(_)));
    }

    #[test]
    fn kind_serde_is_snake_case() {
        let json = serde_json::to_string(&BackendKind::Compressor).unwrap();
        assert_eq!(json, "\"compressor\"");
    }

    #[test]
    fn settle_removes_destination_and_rewraps() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("output.mp4");
        std::fs::write(&dest, b"partial").unwrap();

        let err = settle("test", &dest, Err(Error::tool("ffmpeg", "exit 1"))).unwrap_err();
        assert!(!dest.exists());
        assert_matches!(err, Error::Backend { ref engine, ref message } if engine == "test" && message.contains("exit 1"));
    }

    #[test]
    fn settle_keeps_cancellation_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("output.mp4");
        std::fs::write(&dest, b"partial").unwrap();

        let err = settle("test", &dest, Err(Error::Cancelled)).unwrap_err();
        assert!(err.is_cancelled());
        assert!(!dest.exists());
    }

    struct Sleepy;

    #[async_trait]
    impl Transcode for Sleepy {
        fn kind(&self) -> BackendKind {
            BackendKind::Transform
        }
        fn name(&self) -> &'static str {
            "sleepy"
        }
        fn profile(&self) -> &BackendProfile {
            &transform::PROFILE
        }
        async fn transcode(
            &self,
            _job: BackendJob,
            cancel: CancellationToken,
        ) -> cs_core::Result<BackendOutput> {
            cancel.cancelled().await;
            Err(Error::Cancelled)
        }
    }

    /// Ignores its token entirely.
    struct Stubborn;

    #[async_trait]
    impl Transcode for Stubborn {
        fn kind(&self) -> BackendKind {
            BackendKind::Compressor
        }
        fn name(&self) -> &'static str {
            "stubborn"
        }
        fn profile(&self) -> &BackendProfile {
            &compressor::PROFILE
        }
        async fn transcode(
            &self,
            _job: BackendJob,
            _cancel: CancellationToken,
        ) -> cs_core::Result<BackendOutput> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(BackendOutput::NotNeeded)
        }
    }

    fn job() -> BackendJob {
        let info = MediaMetadata::empty();
        BackendJob {
            source: PathBuf::from("/tmp/in.bin"),
            destination: PathBuf::from("/tmp/out.mp4"),
            targets: EncodingTargets::compute(&info, &Default::default(), &transform::PROFILE),
            source_info: info,
            progress: ProgressReporter::detached(),
        }
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_backend() {
        let parent = CancellationToken::new();
        let handle = start(Arc::new(Sleepy), job(), &parent);
        parent.cancel();
        assert_matches!(handle.wait().await, Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn handle_cancel_does_not_touch_parent() {
        let parent = CancellationToken::new();
        let handle = start(Arc::new(Sleepy), job(), &parent);
        handle.cancel();
        assert_matches!(handle.wait().await, Err(Error::Cancelled));
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn stop_aborts_unresponsive_backend() {
        let handle = start(Arc::new(Stubborn), job(), &CancellationToken::new());
        let started = std::time::Instant::now();
        let result = handle.stop(Duration::from_millis(50)).await;
        assert_matches!(result, Err(Error::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
