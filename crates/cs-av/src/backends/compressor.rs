//! Variant C: a blocking compressor driven from a dedicated thread.
//!
//! [`Compressor::compress`] runs ffmpeg synchronously and picks its own
//! output file name inside the directory it is given. It reports no progress.
//! The adapter interrupts it through a shared stop flag that a small task
//! raises when the job's cancellation token fires.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use cs_core::{BackendProfile, EncodingTargets, Error};

use super::ffmpeg::{AudioParams, EncodeArgs};
use super::{settle, BackendJob, BackendKind, BackendOutput, Transcode};
use crate::tools::ToolRegistry;
use crate::workspace::remove_if_exists;

pub const NAME: &str = "compressor";

pub const PROFILE: BackendProfile = BackendProfile {
    video_bitrate: 300_000,
    audio_bitrate: 64_000,
    audio_channels: 2,
    max_audio_sample_rate: 44_100,
    key_frame_interval_secs: 10,
    frame_rate_cap: None,
};

/// How often the blocking loop checks the child and the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Trailing stderr kept for error messages.
const STDERR_TAIL_CHARS: usize = 2000;

/// Synchronous compressor. Every call blocks the calling thread until the
/// encode ends or `stop` is raised.
#[derive(Debug, Clone)]
pub struct Compressor {
    ffmpeg: PathBuf,
}

impl Compressor {
    pub fn new(ffmpeg: PathBuf) -> Self {
        Self { ffmpeg }
    }

    /// Compress `source` into a new `VIDEO_<millis>.mp4` inside `out_dir` and
    /// return its path.
    pub fn compress(
        &self,
        source: &Path,
        out_dir: &Path,
        targets: &EncodingTargets,
        stop: &AtomicBool,
    ) -> cs_core::Result<PathBuf> {
        if stop.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let output = out_dir.join(format!("VIDEO_{millis}.mp4"));

        let args = compress_args(source, &output, targets);

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::tool("ffmpeg", format!("failed to spawn: {e}")))?;

        // Drain stderr off-thread so a chatty encoder cannot fill the pipe.
        let stderr = child.stderr.take();
        let reader = std::thread::spawn(move || {
            let mut text = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut text);
            }
            text
        });

        let status = loop {
            if stop.load(Ordering::SeqCst) {
                if let Err(e) = child.kill() {
                    tracing::warn!(backend = NAME, error = %e, "failed to kill compressor process");
                }
                if let Err(e) = child.wait() {
                    tracing::warn!(backend = NAME, error = %e, "failed to reap compressor process");
                }
                remove_if_exists(&output);
                return Err(Error::Cancelled);
            }
            match child.try_wait()? {
                Some(status) => break status,
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        let stderr = reader.join().unwrap_or_default();
        if !status.success() {
            remove_if_exists(&output);
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL_CHARS);
            let tail = stderr.get(tail_start..).unwrap_or(&stderr).trim();
            return Err(Error::tool(
                "ffmpeg",
                format!("exited with status {status}: {tail}"),
            ));
        }
        if !output.exists() {
            return Err(Error::tool("ffmpeg", "finished without writing output"));
        }
        Ok(output)
    }
}

fn compress_args(source: &Path, output: &Path, targets: &EncodingTargets) -> Vec<String> {
    EncodeArgs::new(source, output)
        .size(targets.resolution.width, targets.resolution.height)
        .video_bitrate(targets.video_bitrate)
        .frame_rate(targets.frame_rate_cap)
        .key_frame_interval(targets.key_frame_interval_secs)
        .audio(AudioParams {
            bitrate: targets.audio_bitrate,
            channels: Some(targets.audio_channels),
            sample_rate: Some(targets.audio_sample_rate),
        })
        .build()
}

/// [`Transcode`] adapter over a [`Compressor`].
#[derive(Debug, Clone)]
pub struct CompressorBackend {
    compressor: Compressor,
}

impl CompressorBackend {
    pub fn new(ffmpeg: PathBuf) -> Self {
        Self {
            compressor: Compressor::new(ffmpeg),
        }
    }

    pub fn from_registry(tools: &ToolRegistry) -> cs_core::Result<Self> {
        let ffmpeg = tools.require("ffmpeg")?;
        Ok(Self::new(ffmpeg.path.clone()))
    }

    async fn run(&self, job: &BackendJob, cancel: &CancellationToken) -> cs_core::Result<BackendOutput> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let parent = job.destination.parent().unwrap_or_else(|| Path::new("."));
        let scratch = tempfile::Builder::new().prefix("temp").tempdir_in(parent)?;

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();

        let compressor = self.compressor.clone();
        let source = job.source.clone();
        let out_dir = scratch.path().to_path_buf();
        let targets = job.targets;
        let flag = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("clipshrink-compressor".into())
            .spawn(move || {
                let result = compressor.compress(&source, &out_dir, &targets, &flag);
                let _ = tx.send(result);
            })?;

        let interrupter = {
            let stop = Arc::clone(&stop);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                stop.store(true, Ordering::SeqCst);
            })
        };

        let result = rx.await.unwrap_or_else(|_| {
            Err(Error::backend(NAME, "compressor thread exited without a result"))
        });
        interrupter.abort();

        let path = result?;
        Ok(BackendOutput::Encoded {
            path,
            scratch: Some(scratch),
        })
    }
}

#[async_trait]
impl Transcode for CompressorBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Compressor
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn profile(&self) -> &BackendProfile {
        &PROFILE
    }

    async fn transcode(
        &self,
        job: BackendJob,
        cancel: CancellationToken,
    ) -> cs_core::Result<BackendOutput> {
        let result = self.run(&job, &cancel).await;
        settle(NAME, &job.destination, result)
    }
}
