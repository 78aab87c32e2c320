//! Shared fixtures for integration tests.
//!
//! Two flavours of harness live here: in-process fakes ([`MarkerProber`],
//! [`FakeEncoder`]) for exercising the orchestrator directly, and stand-in
//! `ffmpeg`/`ffprobe` shell scripts ([`tools`]) for driving the full
//! [`clipshrink::Engine`] stack without real media.
//!
//! Source files are tagged by content: a file containing `SMALL` probes as a
//! short 320x240 clip and one containing `HANG` makes the fake encoders block
//! until cancelled. Everything else probes as a 10 s 1080p clip.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use clipshrink::{
    BackendJob, BackendKind, BackendOutput, BackendProfile, Config, Error, MediaMetadata,
    ProgressSender, Prober, Transcode,
};

pub const SMALL_MARKER: &[u8] = b"SMALL";
pub const HANG_MARKER: &[u8] = b"HANG";

pub const PROFILE: BackendProfile = BackendProfile {
    video_bitrate: 300_000,
    audio_bitrate: 64_000,
    audio_channels: 2,
    max_audio_sample_rate: 44_100,
    key_frame_interval_secs: 10,
    frame_rate_cap: None,
};

/// 10 s of 1920x1080 at roughly 8 Mbps.
pub fn large_1080p() -> MediaMetadata {
    MediaMetadata {
        mime_type: Some("video/mp4".into()),
        width: 1920,
        height: 1080,
        declared_bitrate: Some(8_000_000),
        duration_secs: Some(10.0),
        frame_count: Some(300),
        audio_sample_rate: Some(48_000),
        ..MediaMetadata::empty()
    }
}

/// 2 s of 320x240 at 400 Kbps.
pub fn small_240p() -> MediaMetadata {
    MediaMetadata {
        mime_type: Some("video/mp4".into()),
        width: 320,
        height: 240,
        declared_bitrate: Some(400_000),
        duration_secs: Some(2.0),
        frame_count: Some(60),
        audio_sample_rate: Some(44_100),
        ..MediaMetadata::empty()
    }
}

/// What every fake encoder claims to have produced.
pub fn encoded_540p() -> MediaMetadata {
    MediaMetadata {
        width: 960,
        height: 540,
        declared_bitrate: Some(300_000),
        ..large_1080p()
    }
}

/// Write a source file of exactly `len` bytes that starts with `marker`.
pub fn write_source(dir: &Path, name: &str, marker: &[u8], len: usize) -> PathBuf {
    let mut bytes = marker.to_vec();
    bytes.resize(len.max(marker.len()), 0);
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Sorted file names directly inside `dir`; empty when it does not exist.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

pub fn config(cache: &Path, throttle_ms: u64) -> Config {
    let mut config = Config::default();
    config.cache.dir = cache.to_path_buf();
    config.progress.throttle_ms = throttle_ms;
    config
}

fn contains(path: &Path, marker: &[u8]) -> bool {
    std::fs::read(path)
        .map(|bytes| bytes.windows(marker.len()).any(|w| w == marker))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// In-process fakes
// ---------------------------------------------------------------------------

/// Probes by content marker and file extension instead of parsing anything.
pub struct MarkerProber;

impl Prober for MarkerProber {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn probe(&self, path: &Path) -> clipshrink::Result<MediaMetadata> {
        let file_size = std::fs::metadata(path)?.len();
        let info = if path.extension().is_some_and(|ext| ext == "mp4") {
            encoded_540p()
        } else if contains(path, SMALL_MARKER) {
            small_240p()
        } else {
            large_1080p()
        };
        Ok(MediaMetadata { file_size, ..info })
    }

    fn supports(&self, _path: &Path) -> bool {
        true
    }
}

/// Cooperative encoder: reports a few progress steps, honours cancellation
/// and writes `encoded` to its destination.
pub struct FakeEncoder {
    kind: BackendKind,
    step: Duration,
    calls: AtomicUsize,
    jobs: Mutex<Vec<BackendJob>>,
}

impl FakeEncoder {
    pub fn new(kind: BackendKind) -> Arc<Self> {
        Self::with_step(kind, Duration::from_millis(5))
    }

    pub fn with_step(kind: BackendKind, step: Duration) -> Arc<Self> {
        Arc::new(Self {
            kind,
            step,
            calls: AtomicUsize::new(0),
            jobs: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Jobs received so far, in order.
    pub fn jobs(&self) -> Vec<BackendJob> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl Transcode for FakeEncoder {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "fake-encoder"
    }

    fn profile(&self) -> &BackendProfile {
        &PROFILE
    }

    async fn transcode(
        &self,
        job: BackendJob,
        cancel: CancellationToken,
    ) -> clipshrink::Result<BackendOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.jobs.lock().push(job.clone());

        tokio::fs::write(&job.destination, b"partial").await?;
        if contains(&job.source, HANG_MARKER) {
            job.progress.report(0.1);
            cancel.cancelled().await;
            return Err(Error::Cancelled);
        }

        for ratio in [0.25, 0.5, 0.75] {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.step) => job.progress.report(ratio),
            }
        }
        tokio::fs::write(&job.destination, b"encoded").await?;
        Ok(BackendOutput::Encoded {
            path: job.destination,
            scratch: None,
        })
    }
}

/// Ignores cancellation entirely and never finishes on its own.
pub struct Stubborn;

#[async_trait]
impl Transcode for Stubborn {
    fn kind(&self) -> BackendKind {
        BackendKind::Compressor
    }

    fn name(&self) -> &'static str {
        "stubborn"
    }

    fn profile(&self) -> &BackendProfile {
        &PROFILE
    }

    async fn transcode(
        &self,
        job: BackendJob,
        _cancel: CancellationToken,
    ) -> clipshrink::Result<BackendOutput> {
        tokio::fs::write(&job.destination, b"partial").await?;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(BackendOutput::NotNeeded)
    }
}

/// Progress sink that records every delivered ratio.
pub fn recording_sink() -> (ProgressSender, Arc<Mutex<Vec<f32>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (ProgressSender::new(move |ratio| sink.lock().push(ratio)), seen)
}

pub fn assert_monotonic(ratios: &[f32]) {
    for pair in ratios.windows(2) {
        assert!(pair[0] <= pair[1], "progress went backwards: {ratios:?}");
    }
    for ratio in ratios {
        assert!((0.0..=1.0).contains(ratio), "out of range: {ratios:?}");
    }
}

// ---------------------------------------------------------------------------
// Stand-in tools
// ---------------------------------------------------------------------------

/// Fake `ffmpeg` and `ffprobe` executables.
///
/// They live in a directory that survives the whole test process because the
/// transform backend's engine is process-wide and keeps the path it was
/// first initialized with.
#[cfg(unix)]
pub mod tools {
    use std::path::{Path, PathBuf};
    use std::sync::OnceLock;

    use tempfile::TempDir;

    use clipshrink::Config;

    static TOOLS: OnceLock<TempDir> = OnceLock::new();

    const FFMPEG: &str = r#"#!/bin/sh
if [ "$2" = "-encoders" ]; then
  echo "Encoders:"
  echo " V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC"
  echo " A....D aac                  AAC (Advanced Audio Coding)"
  exit 0
fi
input=""
prev=""
for arg; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  prev="$arg"
done
if grep -q HANG "$input" 2>/dev/null; then
  exec sleep 30
fi
echo "out_time_us=5000000" >&2
echo "progress=continue" >&2
echo "out_time_us=10000000" >&2
echo "progress=end" >&2
printf 'encoded' > "$prev"
"#;

    const FFPROBE: &str = r#"#!/bin/sh
for last; do :; done
case "$last" in
  *.mp4)
    cat <<'JSON'
{"format":{"format_name":"mov,mp4,m4a,3gp,3g2,mj2","duration":"10.000000","bit_rate":"300000"},
 "streams":[{"codec_type":"video","width":960,"height":540,"nb_frames":"300","r_frame_rate":"30/1"},
            {"codec_type":"audio","sample_rate":"44100"}]}
JSON
    ;;
  *)
    if grep -q SMALL "$last"; then
      cat <<'JSON'
{"format":{"format_name":"mov,mp4,m4a,3gp,3g2,mj2","duration":"2.000000","bit_rate":"400000"},
 "streams":[{"codec_type":"video","width":320,"height":240,"nb_frames":"60","r_frame_rate":"30/1"},
            {"codec_type":"audio","sample_rate":"44100"}]}
JSON
    else
      cat <<'JSON'
{"format":{"format_name":"mov,mp4,m4a,3gp,3g2,mj2","duration":"10.000000","bit_rate":"8000000"},
 "streams":[{"codec_type":"video","width":1920,"height":1080,"nb_frames":"300","r_frame_rate":"30/1"},
            {"codec_type":"audio","sample_rate":"48000"}]}
JSON
    fi
    ;;
esac
"#;

    fn install(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Directory holding both scripts, created on first use.
    pub fn dir() -> &'static Path {
        TOOLS
            .get_or_init(|| {
                let dir = tempfile::Builder::new()
                    .prefix("clipshrink-tools")
                    .tempdir()
                    .unwrap();
                install(dir.path(), "ffmpeg", FFMPEG);
                install(dir.path(), "ffprobe", FFPROBE);
                dir
            })
            .path()
    }

    /// Engine config pointing at the fake tools and `cache`.
    pub fn config(cache: &Path, throttle_ms: u64) -> Config {
        let mut config = super::config(cache, throttle_ms);
        config.tools.ffmpeg_path = Some(dir().join("ffmpeg"));
        config.tools.ffprobe_path = Some(dir().join("ffprobe"));
        config
    }
}
