//! Media-domain data model: resolutions, probed metadata, encoding targets and
//! job results.
//!
//! Everything here is immutable once constructed. A file is probed into a
//! [`MediaMetadata`] once; the transcoded output gets its own fresh value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::sizing::scale_to;

/// Durations at or below this many seconds are treated as unknown.
pub const MIN_TRUSTED_DURATION_SECS: f64 = 0.1;

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// A frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either edge is zero.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width divided by height, or `None` for a degenerate size.
    pub fn aspect(&self) -> Option<f64> {
        if self.is_degenerate() {
            None
        } else {
            Some(self.width as f64 / self.height as f64)
        }
    }

    /// The longer of the two edges.
    pub fn longer_edge(&self) -> u32 {
        self.width.max(self.height)
    }

    /// The shorter of the two edges.
    pub fn shorter_edge(&self) -> u32 {
        self.width.min(self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ---------------------------------------------------------------------------
// SizingLimits
// ---------------------------------------------------------------------------

/// Orientation-independent caps for the output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingLimits {
    pub longer_edge_cap: u32,
    pub shorter_edge_cap: u32,
}

impl SizingLimits {
    pub const fn new(longer_edge_cap: u32, shorter_edge_cap: u32) -> Self {
        Self {
            longer_edge_cap,
            shorter_edge_cap,
        }
    }
}

impl Default for SizingLimits {
    fn default() -> Self {
        Self::new(960, 540)
    }
}

// ---------------------------------------------------------------------------
// MediaMetadata
// ---------------------------------------------------------------------------

/// Container and track metadata extracted from a single file.
///
/// Numeric fields are best-effort: anything the prober could not determine is
/// `None`. Only `width`/`height` default to zero, which routes a file with an
/// unknown frame size through the degenerate branch of [`scale_to`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub mime_type: Option<String>,
    pub rotation_degrees: i32,
    pub width: u32,
    pub height: u32,
    pub declared_bitrate: Option<u64>,
    pub duration_secs: Option<f64>,
    pub frame_count: Option<u64>,
    pub audio_sample_rate: Option<u32>,
    /// Size of the file on disk when it was probed.
    pub file_size: u64,
}

impl MediaMetadata {
    /// Metadata with a 0x0 frame and every optional field absent.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Drop values that would be misleading rather than informative:
    /// near-zero durations and zero frame counts or sample rates.
    pub fn normalized(mut self) -> Self {
        self.duration_secs = self
            .duration_secs
            .filter(|d| d.is_finite() && *d > MIN_TRUSTED_DURATION_SECS);
        self.frame_count = self.frame_count.filter(|n| *n > 0);
        self.audio_sample_rate = self.audio_sample_rate.filter(|r| *r > 0);
        self.declared_bitrate = self.declared_bitrate.filter(|b| *b > 0);
        self
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Frames per second, when both the frame count and duration are known.
    pub fn frame_ratio(&self) -> Option<f64> {
        match (self.frame_count, self.duration_secs) {
            (Some(frames), Some(duration)) if duration > 0.0 => Some(frames as f64 / duration),
            _ => None,
        }
    }

    /// Average bits per second over the whole file.
    ///
    /// Only defined when the duration is longer than
    /// [`MIN_TRUSTED_DURATION_SECS`].
    pub fn actual_bits_per_second(&self) -> Option<f64> {
        let duration = self.duration_secs?;
        if duration > MIN_TRUSTED_DURATION_SECS {
            Some(self.file_size as f64 * 8.0 / duration)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// BackendProfile / EncodingTargets
// ---------------------------------------------------------------------------

/// Fixed tuning a backend applies to every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendProfile {
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub audio_channels: u8,
    pub max_audio_sample_rate: u32,
    pub key_frame_interval_secs: u32,
    pub frame_rate_cap: Option<u32>,
}

/// Encoding parameters for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingTargets {
    pub resolution: Resolution,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u8,
    pub key_frame_interval_secs: u32,
    pub frame_rate_cap: Option<u32>,
}

impl EncodingTargets {
    /// Combine a probe result, the sizing caps and a backend's fixed profile.
    ///
    /// The audio sample rate never exceeds the input's; when the input rate is
    /// unknown the profile cap is used.
    pub fn compute(info: &MediaMetadata, limits: &SizingLimits, profile: &BackendProfile) -> Self {
        let resolution = scale_to(
            info.resolution(),
            limits.longer_edge_cap,
            limits.shorter_edge_cap,
        );
        let audio_sample_rate = info
            .audio_sample_rate
            .map(|rate| rate.min(profile.max_audio_sample_rate))
            .unwrap_or(profile.max_audio_sample_rate);

        Self {
            resolution,
            video_bitrate: profile.video_bitrate,
            audio_bitrate: profile.audio_bitrate,
            audio_sample_rate,
            audio_channels: profile.audio_channels,
            key_frame_interval_secs: profile.key_frame_interval_secs,
            frame_rate_cap: profile.frame_rate_cap,
        }
    }
}

// ---------------------------------------------------------------------------
// JobResult
// ---------------------------------------------------------------------------

/// The authoritative output of a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    /// A backend produced a new file.
    Transcoded { path: PathBuf, metadata: MediaMetadata },
    /// The input already satisfied the constraints; no encoding took place.
    PassedThrough { path: PathBuf, metadata: MediaMetadata },
}

impl JobResult {
    pub fn path(&self) -> &Path {
        match self {
            Self::Transcoded { path, .. } | Self::PassedThrough { path, .. } => path,
        }
    }

    pub fn metadata(&self) -> &MediaMetadata {
        match self {
            Self::Transcoded { metadata, .. } | Self::PassedThrough { metadata, .. } => metadata,
        }
    }

    pub fn was_transcoded(&self) -> bool {
        matches!(self, Self::Transcoded { .. })
    }
}
