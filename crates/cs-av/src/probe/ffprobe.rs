//! FFprobe-based [`cs_probe::Prober`] implementation.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the JSON output into [`cs_core::MediaMetadata`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use cs_core::{Error, MediaMetadata};
use cs_probe::Prober;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// How long a single ffprobe run may take.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// A prober backed by the `ffprobe` CLI.
///
/// Unlike the native prober it reports the container's declared bitrate and
/// understands nearly every format ffmpeg can decode.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    /// Path to the ffprobe binary.
    ffprobe_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self {
            ffprobe_path,
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Create a prober from a discovered tool registry.
    pub fn from_registry(tools: &ToolRegistry) -> Option<Self> {
        tools
            .require("ffprobe")
            .ok()
            .map(|cfg| Self::new(cfg.path.clone()))
    }

    /// Kill ffprobe and fail the probe after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn probe_async(&self, path: &Path) -> cs_core::Result<MediaMetadata> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy());
        cmd.timeout(self.timeout);

        let output = cmd
            .execute()
            .await
            .map_err(|e| Error::probe(format!("{} ({})", e, path.display())))?;

        let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        parse_ffprobe_json(&output.stdout, file_size)
    }
}

impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    fn probe(&self, path: &Path) -> cs_core::Result<MediaMetadata> {
        // Probers are sync; callers run them off the async workers.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => tokio::task::block_in_place(|| handle.block_on(self.probe_async(path))),
            Err(_) => {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| Error::probe(format!("failed to start runtime for ffprobe: {e}")))?;
                rt.block_on(self.probe_async(path))
            }
        }
    }

    fn supports(&self, _path: &Path) -> bool {
        // ffprobe sniffs content, so the file name tells us nothing.
        true
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    sample_rate: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    side_data_type: Option<String>,
    rotation: Option<f64>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Map raw ffprobe JSON to metadata. `file_size` is used when the format
/// section omits the size.
fn parse_ffprobe_json(json: &str, file_size: u64) -> cs_core::Result<MediaMetadata> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::probe(format!("ffprobe JSON parse error: {e}")))?;

    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::probe("no video stream"))?;

    let audio_sample_rate = output
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("audio"))
        .find_map(|s| s.sample_rate.as_deref()?.parse::<u32>().ok());

    let duration_secs = output
        .format
        .duration
        .as_deref()
        .or(video.duration.as_deref())
        .and_then(|s| s.parse::<f64>().ok());

    // Some containers (Matroska) carry no frame count; estimate from rate.
    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .or_else(|| {
            let fps = parse_frame_rate(video.r_frame_rate.as_deref()?)?;
            Some((fps * duration_secs?).round() as u64)
        });

    Ok(MediaMetadata {
        mime_type: output.format.format_name.as_deref().map(mime_for_format),
        rotation_degrees: stream_rotation(video),
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        declared_bitrate: output
            .format
            .bit_rate
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok()),
        duration_secs,
        frame_count,
        audio_sample_rate,
        file_size: output
            .format
            .size
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(file_size),
    }
    .normalized())
}

/// Clockwise rotation in `0..360`.
///
/// The display matrix reports counter-clockwise degrees; the legacy `rotate`
/// tag is already clockwise.
fn stream_rotation(stream: &FfprobeStream) -> i32 {
    let from_matrix = stream
        .side_data_list
        .iter()
        .filter(|sd| sd.side_data_type.as_deref() == Some("Display Matrix"))
        .find_map(|sd| sd.rotation)
        .map(|ccw| -(ccw.round() as i32));

    let degrees = from_matrix
        .or_else(|| stream.tags.rotate.as_deref()?.trim().parse::<i32>().ok())
        .unwrap_or(0);

    degrees.rem_euclid(360)
}

fn parse_frame_rate(rate_str: &str) -> Option<f64> {
    if let Some((num, den)) = rate_str.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        return (den != 0.0).then(|| num / den);
    }
    rate_str.parse().ok()
}

fn mime_for_format(format_name: &str) -> String {
    let lower = format_name.to_lowercase();
    if lower.contains("mp4") || lower.contains("mov") {
        "video/mp4".to_string()
    } else if lower.contains("matroska") || lower.contains("webm") {
        "video/x-matroska".to_string()
    } else {
        let first = lower.split(',').next().unwrap_or("unknown");
        format!("video/{first}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30/1",
                "nb_frames": "300",
                "side_data_list": [
                    { "side_data_type": "Display Matrix", "rotation": -90 }
                ]
            },
            { "codec_type": "audio", "sample_rate": "48000" }
        ],
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "10.000000",
            "size": "10000000",
            "bit_rate": "8000000"
        }
    }"#;

    #[test]
    fn full_output_maps_every_field() {
        let info = parse_ffprobe_json(SAMPLE, 0).unwrap();
        assert_eq!(info.mime_type.as_deref(), Some("video/mp4"));
        assert_eq!(info.rotation_degrees, 90);
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.declared_bitrate, Some(8_000_000));
        assert_eq!(info.duration_secs, Some(10.0));
        assert_eq!(info.frame_count, Some(300));
        assert_eq!(info.audio_sample_rate, Some(48_000));
        assert_eq!(info.file_size, 10_000_000);
        assert_eq!(info.frame_ratio(), Some(30.0));
    }

    #[test]
    fn missing_video_stream_is_probe_error() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert!(matches!(parse_ffprobe_json(json, 10), Err(Error::Probe(_))));
    }

    #[test]
    fn invalid_json_is_probe_error() {
        assert!(matches!(parse_ffprobe_json("nope", 10), Err(Error::Probe(_))));
    }

    #[test]
    fn sparse_output_leaves_fields_absent() {
        let json = r#"{"streams": [{"codec_type": "video"}], "format": {"duration": "0.04"}}"#;
        let info = parse_ffprobe_json(json, 1234).unwrap();
        assert_eq!((info.width, info.height), (0, 0));
        assert_eq!(info.duration_secs, None);
        assert_eq!(info.frame_count, None);
        assert_eq!(info.audio_sample_rate, None);
        assert_eq!(info.declared_bitrate, None);
        assert_eq!(info.file_size, 1234);
    }

    #[test]
    fn frame_count_estimated_from_rate() {
        let json = r#"{"streams": [{"codec_type": "video", "r_frame_rate": "25/1"}],
                       "format": {"format_name": "matroska,webm", "duration": "4.0"}}"#;
        let info = parse_ffprobe_json(json, 1).unwrap();
        assert_eq!(info.frame_count, Some(100));
        assert_eq!(info.mime_type.as_deref(), Some("video/x-matroska"));
    }

    #[test]
    fn rotate_tag_fallback() {
        let json = r#"{"streams": [{"codec_type": "video", "tags": {"rotate": "270"}}], "format": {}}"#;
        assert_eq!(parse_ffprobe_json(json, 1).unwrap().rotation_degrees, 270);
    }

    #[test]
    fn frame_rate_fraction() {
        assert!((parse_frame_rate("24000/1001").unwrap() - 23.976).abs() < 0.01);
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("invalid"), None);
    }

    #[test]
    fn mime_mapping() {
        assert_eq!(mime_for_format("avi"), "video/avi");
        assert_eq!(mime_for_format("mov,mp4,m4a,3gp,3g2,mj2"), "video/mp4");
    }

    #[cfg(unix)]
    #[test]
    fn probe_runs_the_tool() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("out.json");
        std::fs::write(&json_path, SAMPLE).unwrap();
        let script = dir.path().join("ffprobe");
        std::fs::write(&script, format!("#!/bin/sh\ncat '{}'\n", json_path.display())).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let input = dir.path().join("input.bin");
        std::fs::write(&input, b"whatever").unwrap();

        let prober = FfprobeProber::new(script);
        assert!(prober.supports(&input));
        let info = prober.probe(&input).unwrap();
        assert_eq!(info.width, 1920);
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_is_probe_error() {
        let prober = FfprobeProber::new(PathBuf::from("false"));
        let err = prober.probe(Path::new("/tmp/whatever.mp4")).unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
    }

    #[cfg(unix)]
    #[test]
    fn hung_tool_times_out() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Instant;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ffprobe");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let started = Instant::now();
        let err = FfprobeProber::new(script)
            .with_timeout(Duration::from_millis(200))
            .probe(Path::new("/tmp/whatever.mp4"))
            .unwrap_err();

        assert!(matches!(err, Error::Probe(_)));
        assert!(err.to_string().contains("timed out"), "{err}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn probe_works_from_the_blocking_pool() {
        let prober = FfprobeProber::new(PathBuf::from("false"));
        let err = tokio::task::spawn_blocking(move || prober.probe(Path::new("/tmp/whatever.mp4")))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
    }
}
