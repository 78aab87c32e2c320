//! Variant B: strategy-driven transcoder.
//!
//! The engine is configured with a [`VideoStrategy`] and an [`AudioStrategy`]
//! and evaluates the resizer itself, so this backend owns its own sizing call
//! rather than trusting the orchestrator's. The engine may also conclude that
//! the source already satisfies the strategies and report
//! [`Completion::NotNeeded`] without encoding anything.

pub mod resizer;

pub use resizer::{AtMostResizer, ChainResizer, ExactResizer, FractionResizer, Resizer};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cs_core::{BackendProfile, MediaMetadata, SizingLimits};

use super::ffmpeg::{run_encode, AudioParams, EncodeArgs};
use super::{settle, BackendJob, BackendKind, BackendOutput, Transcode};
use crate::tools::ToolRegistry;
use crate::workspace::remove_if_exists;

pub const NAME: &str = "strategy";

pub const PROFILE: BackendProfile = BackendProfile {
    video_bitrate: 300_000,
    audio_bitrate: 60_000,
    audio_channels: 1,
    max_audio_sample_rate: 44_100,
    key_frame_interval_secs: 10,
    frame_rate_cap: Some(15),
};

const MP4_MIME: &str = "video/mp4";

#[derive(Debug)]
pub struct VideoStrategy {
    pub resizer: Box<dyn Resizer>,
    /// Upper bound on the output frame rate.
    pub frame_rate: Option<u32>,
    pub key_frame_interval_secs: u32,
    pub bitrate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioStrategy {
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate: u32,
}

/// Terminal state of a successful engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success,
    /// The source already satisfied the strategies; nothing was written.
    NotNeeded,
}

/// The strategy engine.
#[derive(Debug, Clone)]
pub struct StrategyTranscoder {
    ffmpeg: PathBuf,
}

impl StrategyTranscoder {
    pub fn new(ffmpeg: PathBuf) -> Self {
        Self { ffmpeg }
    }

    /// The engine's own skip rule. A transcode is unnecessary only when every
    /// property is known and already within the strategy.
    pub fn is_transcode_needed(info: &MediaMetadata, video: &VideoStrategy) -> bool {
        let size_unchanged = video.resizer.resize(info.resolution()) == info.resolution();
        let bitrate_ok = info
            .declared_bitrate
            .is_some_and(|bps| bps <= u64::from(video.bitrate));
        let frame_rate_ok = match video.frame_rate {
            Some(cap) => info.frame_ratio().is_some_and(|fps| fps <= f64::from(cap)),
            None => true,
        };
        let is_mp4 = info.mime_type.as_deref() == Some(MP4_MIME);

        !(size_unchanged && bitrate_ok && frame_rate_ok && is_mp4)
    }

    /// Build the ffmpeg invocation for `info` under the given strategies.
    pub fn plan(
        source: &Path,
        destination: &Path,
        info: &MediaMetadata,
        video: &VideoStrategy,
        audio: &AudioStrategy,
    ) -> EncodeArgs {
        let size = video.resizer.resize(info.resolution());
        // Never raise the frame rate of a source that is already below the cap.
        let frame_rate = video
            .frame_rate
            .filter(|cap| info.frame_ratio().map_or(true, |fps| fps > f64::from(*cap)));

        EncodeArgs::new(source, destination)
            .size(size.width, size.height)
            .video_bitrate(video.bitrate)
            .frame_rate(frame_rate)
            .key_frame_interval(video.key_frame_interval_secs)
            .audio(AudioParams {
                bitrate: audio.bitrate,
                channels: Some(audio.channels),
                sample_rate: Some(audio.sample_rate),
            })
            .with_progress()
    }

    /// Encode `source` into `destination`. `listener` receives every progress
    /// ratio the encoder produces, unthrottled.
    #[allow(clippy::too_many_arguments)]
    pub async fn transcode(
        &self,
        source: &Path,
        destination: &Path,
        info: &MediaMetadata,
        video: &VideoStrategy,
        audio: &AudioStrategy,
        mut listener: impl FnMut(f32),
        cancel: &CancellationToken,
    ) -> cs_core::Result<Completion> {
        if !Self::is_transcode_needed(info, video) {
            return Ok(Completion::NotNeeded);
        }

        let args = Self::plan(source, destination, info, video, audio);
        run_encode(
            &self.ffmpeg,
            &args,
            info.duration_secs,
            |snapshot| {
                if let Some(ratio) = snapshot.ratio {
                    listener(ratio);
                }
            },
            cancel,
        )
        .await?;
        Ok(Completion::Success)
    }
}

/// [`Transcode`] adapter over a [`StrategyTranscoder`].
#[derive(Debug, Clone)]
pub struct StrategyBackend {
    transcoder: StrategyTranscoder,
    limits: SizingLimits,
}

impl StrategyBackend {
    pub fn new(ffmpeg: PathBuf, limits: SizingLimits) -> Self {
        Self {
            transcoder: StrategyTranscoder::new(ffmpeg),
            limits,
        }
    }

    pub fn from_registry(tools: &ToolRegistry, limits: SizingLimits) -> cs_core::Result<Self> {
        let ffmpeg = tools.require("ffmpeg")?;
        Ok(Self::new(ffmpeg.path.clone(), limits))
    }

    fn strategies(&self, job: &BackendJob) -> (VideoStrategy, AudioStrategy) {
        let video = VideoStrategy {
            resizer: Box::new(AtMostResizer::new(
                self.limits.shorter_edge_cap,
                self.limits.longer_edge_cap,
            )),
            frame_rate: job.targets.frame_rate_cap,
            key_frame_interval_secs: job.targets.key_frame_interval_secs,
            bitrate: job.targets.video_bitrate,
        };
        let audio = AudioStrategy {
            channels: job.targets.audio_channels,
            sample_rate: job.targets.audio_sample_rate,
            bitrate: job.targets.audio_bitrate,
        };
        (video, audio)
    }

    async fn run(&self, job: &BackendJob, cancel: &CancellationToken) -> cs_core::Result<BackendOutput> {
        let (video, audio) = self.strategies(job);
        let completion = self
            .transcoder
            .transcode(
                &job.source,
                &job.destination,
                &job.source_info,
                &video,
                &audio,
                |ratio| job.progress.report(ratio),
                cancel,
            )
            .await?;

        match completion {
            Completion::Success => Ok(BackendOutput::Encoded {
                path: job.destination.clone(),
                scratch: None,
            }),
            Completion::NotNeeded => {
                tracing::info!(backend = NAME, source = %job.source.display(), "engine reported transcode not needed");
                remove_if_exists(&job.destination);
                Ok(BackendOutput::NotNeeded)
            }
        }
    }
}

#[async_trait]
impl Transcode for StrategyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Strategy
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
