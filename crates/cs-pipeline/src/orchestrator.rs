//! The transcode orchestrator.
//!
//! Drives one job through probe, sizing, the skip decision and a backend,
//! owns the cancellation and progress protocol, and guarantees that every
//! temp file except the final result is deleted however the job ends.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use cs_av::workspace::{move_file, remove_if_exists};
use cs_av::{BackendJob, BackendKind, BackendOutput, Transcode, Workspace};
use cs_core::config::Config;
use cs_core::{
    needs_transcode, scale_to, EncodingTargets, Error, JobResult, MediaMetadata, ProgressReporter,
    ProgressSender, ProgressThrottle,
};
use cs_probe::Prober;

use crate::job::{JobHandle, JobOutcome, JobReport, JobRequest, JobSource, JobState, StateTracker};

// ---------------------------------------------------------------------------
// BackendRegistry
// ---------------------------------------------------------------------------

/// Backends available to the orchestrator, keyed by [`BackendKind`].
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<BackendKind, Arc<dyn Transcode>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` under its own kind, replacing any previous one.
    pub fn register(&mut self, backend: Arc<dyn Transcode>) {
        self.backends.insert(backend.kind(), backend);
    }

    pub fn with(mut self, backend: Arc<dyn Transcode>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, kind: BackendKind) -> cs_core::Result<Arc<dyn Transcode>> {
        self.backends
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::Config(format!("backend {kind} is not available")))
    }

    /// Registered kinds in a stable order.
    pub fn kinds(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| self.backends.contains_key(kind))
            .collect()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs transcode jobs, one at a time.
pub struct Orchestrator {
    prober: Arc<dyn Prober>,
    backends: BackendRegistry,
    config: Config,
    /// Held for the lifetime of a job.
    active: Mutex<()>,
    next_job: AtomicU64,
}

impl Orchestrator {
    pub fn new(prober: Arc<dyn Prober>, backends: BackendRegistry, config: Config) -> Self {
        Self {
            prober,
            backends,
            config,
            active: Mutex::new(()),
            next_job: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    /// Run a job to completion on the current task.
    ///
    /// A second call waits until the first job has finished.
    pub async fn run(
        &self,
        request: JobRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> JobReport {
        let job_id = self.next_job.fetch_add(1, Ordering::Relaxed);
        let (state_tx, _state_rx) = watch::channel(JobState::Idle);
        self.run_job(job_id, request, progress, cancel, state_tx)
            .await
    }

    /// Run a job on a background task and return a handle to observe and
    /// cancel it.
    pub fn spawn(self: Arc<Self>, request: JobRequest, progress: ProgressSender) -> JobHandle {
        let job_id = self.next_job.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(JobState::Idle);

        let token = cancel.clone();
        let task = tokio::spawn(async move {
            self.run_job(job_id, request, progress, token, state_tx)
                .await
        });

        JobHandle {
            job_id,
            cancel,
            state: state_rx,
            task,
        }
    }

    async fn run_job(
        &self,
        job_id: u64,
        request: JobRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
        state_tx: watch::Sender<JobState>,
    ) -> JobReport {
        let span = tracing::info_span!("job", job_id, backend = %request.backend);
        let mut tracker = StateTracker::new(job_id, state_tx);

        async {
            let _active = tokio::select! {
                guard = self.active.lock() => guard,
                _ = cancel.cancelled() => {
                    tracing::info!("job cancelled before it started");
                    tracker.enter(JobState::Cancelled);
                    return JobOutcome::Cancelled;
                }
            };
            tracing::info!("job started");

            let (reporter, throttle) =
                ProgressThrottle::spawn(Arc::new(progress), self.config.progress.interval());

            let result = match Workspace::create(&self.config.cache.dir) {
                Ok(mut workspace) => {
                    let result = self
                        .execute(request, &mut workspace, &mut tracker, &reporter, &cancel)
                        .await;
                    let keep = result.as_ref().ok().map(|r| r.path().to_path_buf());
                    let removed = workspace.release(keep.as_deref());
                    tracing::debug!(removed = removed.len(), "temp files released");
                    result
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(result) => {
                    reporter.report(1.0);
                    throttle.finish().await;
                    tracker.enter(JobState::Completed);
                    tracing::info!(
                        path = %result.path().display(),
                        transcoded = result.was_transcoded(),
                        "job completed"
                    );
                    JobOutcome::Completed(result)
                }
                Err(e) if e.is_cancelled() => {
                    throttle.abort();
                    tracker.enter(JobState::Cancelled);
                    tracing::info!("job cancelled");
                    JobOutcome::Cancelled
                }
                Err(e) => {
                    throttle.abort();
                    tracker.enter(JobState::Failed);
                    tracing::error!(classification = e.classification(), error = %e, "job failed");
                    JobOutcome::Failed(e)
                }
            }
        }
        .instrument(span)
        .await
        .into_report(job_id, tracker)
    }

    /// Probing through Finalizing. Temp files are registered in `workspace`
    /// and released by the caller.
    async fn execute(
        &self,
        request: JobRequest,
        workspace: &mut Workspace,
        tracker: &mut StateTracker,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> cs_core::Result<JobResult> {
        let backend = self.backends.get(request.backend)?;

        checkpoint(cancel)?;
        tracker.enter(JobState::Probing);
        let input = workspace.temp_file("input", ".bin")?;
        let copied = cancellable(cancel, copy_source(request.source, &input)).await?;
        tracing::debug!(bytes = copied, input = %input.display(), "source copied");
        let info = cancellable(cancel, self.probe(&input)).await?;
        tracing::debug!(
            resolution = %info.resolution(),
            duration = ?info.duration_secs,
            bitrate = ?info.declared_bitrate,
            "input probed"
        );

        checkpoint(cancel)?;
        tracker.enter(JobState::Deciding);
        let limits = self.config.sizing.limits();
        let output_resolution = scale_to(
            info.resolution(),
            limits.longer_edge_cap,
            limits.shorter_edge_cap,
        );
        let file_size = i64::try_from(copied).unwrap_or(i64::MAX);
        let needed = needs_transcode(&info, file_size, output_resolution, self.config.sizing.limit_bps)?;
        tracing::info!(needed, output = %output_resolution, "transcode decision");

        checkpoint(cancel)?;
        if !needed {
            tracker.enter(JobState::Skipped);
            tracker.enter(JobState::Finalizing);
            return Ok(JobResult::PassedThrough {
                path: input,
                metadata: info,
            });
        }

        tracker.enter(JobState::Encoding);
        let output = workspace.temp_file("output", ".mp4")?;
        let targets = EncodingTargets::compute(&info, &limits, backend.profile());
        tracing::info!(backend = backend.name(), ?targets, "encoding");

        let job = BackendJob {
            source: input.clone(),
            destination: output.clone(),
            targets,
            source_info: info.clone(),
            progress: reporter.clone(),
        };
        let mut handle = cs_av::start(backend, job, cancel);
        let finished = tokio::select! {
            result = handle.join() => Some(result),
            _ = cancel.cancelled() => None,
        };
        let outcome = match finished {
            Some(result) => result,
            None => handle.stop(self.config.progress.interval()).await,
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                remove_if_exists(&output);
                // A backend torn down by the cancel may report its own failure.
                if cancel.is_cancelled() && !e.is_cancelled() {
                    tracing::debug!(error = %e, "backend error after cancel");
                    return Err(Error::Cancelled);
                }
                return Err(e);
            }
        };
        // A cancel that raced with completion still wins.
        if cancel.is_cancelled() {
            if let BackendOutput::Encoded { path, .. } = &outcome {
                remove_if_exists(path);
            }
            return Err(Error::Cancelled);
        }

        tracker.enter(JobState::Finalizing);
        match outcome {
            BackendOutput::NotNeeded => Ok(JobResult::PassedThrough {
                path: input,
                metadata: info,
            }),
            BackendOutput::Encoded { path, scratch } => {
                if !same_file(&path, &output) {
                    workspace.adopt(path.clone());
                    tracing::debug!(from = %path.display(), to = %output.display(), "moving backend output");
                    move_file(&path, &output)?;
                }
                drop(scratch);

                let metadata = cancellable(cancel, self.probe(&output)).await?;
                Ok(JobResult::Transcoded {
                    path: output,
                    metadata,
                })
            }
        }
    }

    /// Probe on the blocking pool.
    async fn probe(&self, path: &Path) -> cs_core::Result<MediaMetadata> {
        let prober = Arc::clone(&self.prober);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || prober.probe(&path))
            .await
            .map_err(|e| Error::probe(format!("probe task failed: {e}")))?
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("prober", &self.prober.name())
            .field("backends", &self.backends)
            .finish_non_exhaustive()
    }
}

impl JobOutcome {
    fn into_report(self, job_id: u64, tracker: StateTracker) -> JobReport {
        JobReport {
            job_id,
            outcome: self,
            transitions: tracker.into_transitions(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn checkpoint(cancel: &CancellationToken) -> cs_core::Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Race `fut` against the token; cancellation wins ties.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = cs_core::Result<T>>,
) -> cs_core::Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

/// Copy the request's source into `dest`, returning the number of bytes.
async fn copy_source(source: JobSource, dest: &Path) -> cs_core::Result<u64> {
    match source {
        JobSource::Path(path) => Ok(tokio::fs::copy(&path, dest).await?),
        JobSource::Reader(mut reader) => {
            let mut file = tokio::fs::File::create(dest).await?;
            let copied = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok(copied)
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    let canonical = |p: &Path| std::fs::canonicalize(p).unwrap_or_else(|_| PathBuf::from(p));
    canonical(a) == canonical(b)
}
