//! Progress delivery: the UI-facing sink and the conflating throttle that sits
//! between a backend and that sink.
//!
//! Backends push ratios into a [`ProgressReporter`] as fast as their engine
//! produces them. A single consumer task, owned by [`ProgressThrottle`],
//! forwards at most one value per interval to the [`ProgressSender`], always
//! the most recent one. Intermediate values are simply overwritten.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Default interval between two delivered progress updates.
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

/// Sink receiving progress ratios in `0.0..=1.0`.
pub struct ProgressSender {
    callback: Box<dyn Fn(f32) + Send + Sync>,
}

impl ProgressSender {
    /// Create a new sender from the given callback.
    pub fn new(callback: impl Fn(f32) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Create a no-op sender that discards all progress reports.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    /// Report progress.
    pub fn send(&self, ratio: f32) {
        (self.callback)(ratio);
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}

/// Convert a ratio to a whole percentage, rounding half up.
pub fn percent(ratio: f32) -> u8 {
    (ratio.clamp(0.0, 1.0) * 100.0 + 0.5) as u8
}

/// Producer side of the conflating progress channel.
///
/// Cloning is cheap; all clones feed the same channel. Values are clamped to
/// `0.0..=1.0` and never move backwards.
#[derive(Clone, Debug)]
pub struct ProgressReporter {
    tx: Arc<watch::Sender<f32>>,
}

impl ProgressReporter {
    /// A reporter with no consumer attached. Reports are recorded and can be
    /// read back with [`ProgressReporter::latest`].
    pub fn detached() -> Self {
        let (tx, _rx) = watch::channel(0.0);
        Self { tx: Arc::new(tx) }
    }

    /// Record a new ratio. NaN is ignored; values below the current maximum
    /// are dropped.
    pub fn report(&self, ratio: f32) {
        if ratio.is_nan() {
            return;
        }
        let ratio = ratio.clamp(0.0, 1.0);
        self.tx.send_if_modified(|current| {
            if ratio > *current {
                *current = ratio;
                true
            } else {
                false
            }
        });
    }

    /// The highest ratio reported so far.
    pub fn latest(&self) -> f32 {
        *self.tx.borrow()
    }
}

/// Owner of the consumer task that delivers throttled progress to a sink.
#[derive(Debug)]
pub struct ProgressThrottle {
    task: JoinHandle<()>,
    stop: Option<oneshot::Sender<()>>,
}

impl ProgressThrottle {
    /// Spawn the consumer task on the current tokio runtime.
    pub fn spawn(sink: Arc<ProgressSender>, interval: Duration) -> (ProgressReporter, Self) {
        let (tx, rx) = watch::channel(0.0);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(pump(rx, sink, interval, stop_rx));
        (
            ProgressReporter { tx: Arc::new(tx) },
            Self {
                task,
                stop: Some(stop_tx),
            },
        )
    }

    /// Deliver the latest pending value, if any, and wait for the consumer to
    /// exit.
    pub async fn finish(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::debug!(error = %e, "progress consumer ended abnormally");
        }
    }

    /// Stop delivering immediately, discarding anything pending.
    pub fn abort(self) {
        self.task.abort();
    }
}

async fn pump(
    mut rx: watch::Receiver<f32>,
    sink: Arc<ProgressSender>,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut delivered = 0.0f32;

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut stop => break,
        }

        let latest = *rx.borrow_and_update();
        if latest > delivered {
            sink.send(latest);
            delivered = latest;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut stop => break,
        }
    }

    // Final flush so the sink always ends on the last reported value.
    let latest = *rx.borrow();
    if latest > delivered {
        sink.send(latest);
    }
}
