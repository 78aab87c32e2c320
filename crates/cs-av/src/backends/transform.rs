//! Variant A: explicit format descriptors over a shared, reentrant engine.
//!
//! [`TransformEngine`] is expensive to construct (tool discovery plus an
//! encoder capability check), so one instance per process is created through
//! [`TransformEngine::shared`] and handed to [`TransformBackend`]. The engine
//! reports through a stream of [`TransformEvent`]s; the adapter folds that
//! stream into a single result using [`map_event`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, OnceCell};
use tokio_util::sync::CancellationToken;

use cs_core::config::ToolsConfig;
use cs_core::{BackendProfile, EncodingTargets, Error};

use super::ffmpeg::{run_encode, AudioParams, EncodeArgs};
use super::{settle, BackendJob, BackendKind, BackendOutput, Transcode};
use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

pub const NAME: &str = "transform";

/// Message used when the engine fails without saying why.
pub const NO_ERROR_INFORMATION: &str = "no error information.";

pub const PROFILE: BackendProfile = BackendProfile {
    video_bitrate: 300_000,
    audio_bitrate: 64_000,
    audio_channels: 2,
    max_audio_sample_rate: 44_100,
    key_frame_interval_secs: 10,
    frame_rate_cap: None,
};

/// Encoders the engine refuses to start without.
const REQUIRED_ENCODERS: &[&str] = &["libx264", "aac"];

static SHARED: OnceCell<Arc<TransformEngine>> = OnceCell::const_new();

// ---------------------------------------------------------------------------
// Format descriptors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub key_frame_interval_secs: u32,
    pub frame_rate: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub mime: &'static str,
    pub bitrate: u32,
    pub channels: u8,
    pub sample_rate: u32,
}

impl VideoFormat {
    pub fn from_targets(targets: &EncodingTargets) -> Self {
        Self {
            mime: "video/avc",
            width: targets.resolution.width,
            height: targets.resolution.height,
            bitrate: targets.video_bitrate,
            key_frame_interval_secs: targets.key_frame_interval_secs,
            frame_rate: targets.frame_rate_cap,
        }
    }
}

impl AudioFormat {
    pub fn from_targets(targets: &EncodingTargets) -> Self {
        Self {
            mime: "audio/mp4a-latm",
            bitrate: targets.audio_bitrate,
            channels: targets.audio_channels,
            sample_rate: targets.audio_sample_rate,
        }
    }
}

/// One request handed to the engine.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub id: u64,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub video: VideoFormat,
    pub audio: AudioFormat,
    pub duration_secs: Option<f64>,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Everything the engine can tell a listener about a request.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformEvent {
    Started,
    Progress(f32),
    Completed,
    Cancelled,
    Error(Option<String>),
}

/// What the adapter does with an event.
#[derive(Debug)]
pub enum EventAction {
    Ignore,
    Progress(f32),
    Finish(cs_core::Result<()>),
}

/// The translation table from engine events to adapter actions.
pub fn map_event(event: TransformEvent) -> EventAction {
    match event {
        TransformEvent::Started => EventAction::Ignore,
        TransformEvent::Progress(ratio) => EventAction::Progress(ratio),
        TransformEvent::Completed => EventAction::Finish(Ok(())),
        TransformEvent::Cancelled => EventAction::Finish(Err(Error::Cancelled)),
        TransformEvent::Error(cause) => EventAction::Finish(Err(Error::backend(
            NAME,
            cause.unwrap_or_else(|| NO_ERROR_INFORMATION.to_string()),
        ))),
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Process-wide transcoding engine. Safe to use from many jobs at once.
#[derive(Debug)]
pub struct TransformEngine {
    ffmpeg: PathBuf,
    next_request: AtomicU64,
}

impl TransformEngine {
    /// Locate ffmpeg and verify it carries the required encoders.
    pub async fn initialize(tools: &ToolsConfig) -> cs_core::Result<Self> {
        let registry = ToolRegistry::discover(tools);
        let ffmpeg = registry.require("ffmpeg")?.path.clone();
        Self::with_ffmpeg(ffmpeg).await
    }

    /// Like [`TransformEngine::initialize`] with an explicit ffmpeg path.
    pub async fn with_ffmpeg(ffmpeg: PathBuf) -> cs_core::Result<Self> {
        let output = ToolCommand::new(ffmpeg.clone())
            .args(["-hide_banner", "-encoders"])
            .execute()
            .await?;

        for encoder in REQUIRED_ENCODERS {
            let listed = output
                .stdout
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(*encoder));
            if !listed {
                return Err(Error::tool(
                    "ffmpeg",
                    format!("encoder {encoder} is not available"),
                ));
            }
        }

        tracing::info!(ffmpeg = %ffmpeg.display(), "transform engine initialized");
        Ok(Self {
            ffmpeg,
            next_request: AtomicU64::new(1),
        })
    }

    /// The process-wide engine, created on first use. Later calls return the
    /// same instance and ignore `tools`. A failed initialization is not
    /// cached, so the next call tries again.
    pub async fn shared(tools: &ToolsConfig) -> cs_core::Result<Arc<Self>> {
        SHARED
            .get_or_try_init(|| async { Self::initialize(tools).await.map(Arc::new) })
            .await
            .map(Arc::clone)
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn next_request_id(&self) -> u64 {
        self.next_request.fetch_add(1, Ordering::Relaxed)
    }

    /// Run one request to completion. Every outcome, including failures, is
    /// delivered as an event; exactly one terminal event is sent.
    pub async fn transform(
        &self,
        request: TransformRequest,
        events: mpsc::UnboundedSender<TransformEvent>,
        cancel: &CancellationToken,
    ) {
        let _ = events.send(TransformEvent::Started);
        tracing::debug!(request = request.id, video = ?request.video, audio = ?request.audio, "transform started");

        let args = EncodeArgs::new(&request.source, &request.destination)
            .size(request.video.width, request.video.height)
            .video_bitrate(request.video.bitrate)
            .frame_rate(request.video.frame_rate)
            .key_frame_interval(request.video.key_frame_interval_secs)
            .audio(AudioParams {
                bitrate: request.audio.bitrate,
                channels: Some(request.audio.channels),
                sample_rate: Some(request.audio.sample_rate),
            })
            .with_progress();

        let result = run_encode(
            &self.ffmpeg,
            &args,
            request.duration_secs,
            |snapshot| {
                if let Some(ratio) = snapshot.ratio {
                    let _ = events.send(TransformEvent::Progress(ratio));
                }
            },
            cancel,
        )
        .await;

        let terminal = match result {
            Ok(()) => TransformEvent::Completed,
            Err(Error::Cancelled) => TransformEvent::Cancelled,
            Err(e) => TransformEvent::Error(Some(e.to_string())),
        };
        let _ = events.send(terminal);
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// [`Transcode`] adapter over a [`TransformEngine`].
#[derive(Debug, Clone)]
pub struct TransformBackend {
    engine: Arc<TransformEngine>,
}

impl TransformBackend {
    pub fn new(engine: Arc<TransformEngine>) -> Self {
        Self { engine }
    }

    async fn run(&self, job: &BackendJob, cancel: &CancellationToken) -> cs_core::Result<BackendOutput> {
        let request = TransformRequest {
            id: self.engine.next_request_id(),
            source: job.source.clone(),
            destination: job.destination.clone(),
            video: VideoFormat::from_targets(&job.targets),
            audio: AudioFormat::from_targets(&job.targets),
            duration_secs: job.source_info.duration_secs,
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let drive = self.engine.transform(request, tx, cancel);
        let listen = async {
            let mut outcome = None;
            while let Some(event) = rx.recv().await {
                match map_event(event) {
                    EventAction::Ignore => {}
                    EventAction::Progress(ratio) => job.progress.report(ratio),
                    // Only the first terminal event counts.
                    EventAction::Finish(result) => {
                        outcome.get_or_insert(result);
                    }
                }
            }
            outcome
        };

        let ((), outcome) = tokio::join!(drive, listen);
        outcome
            .unwrap_or_else(|| Err(Error::backend(NAME, "engine ended without a terminal event")))
            .map(|()| BackendOutput::Encoded {
                path: job.destination.clone(),
                scratch: None,
            })
    }
}

#[async_trait]
impl Transcode for TransformBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Transform
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
