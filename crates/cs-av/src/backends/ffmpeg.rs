//! ffmpeg command lines shared by the backends.
//!
//! Output is always MP4 with H.264 video and AAC audio.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::command::ToolCommand;
use crate::progress::{EncodeProgress, ProgressParser};
use crate::tools::ENCODE_TIMEOUT;

/// Audio encoding parameters. `None` fields leave ffmpeg's choice in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub bitrate: u32,
    pub channels: Option<u8>,
    pub sample_rate: Option<u32>,
}

/// Builder for a single-pass H.264/AAC encode.
#[derive(Debug, Clone)]
pub struct EncodeArgs {
    source: PathBuf,
    destination: PathBuf,
    size: Option<(u32, u32)>,
    video_bitrate: Option<u32>,
    frame_rate: Option<u32>,
    key_frame_interval_secs: Option<u32>,
    audio: Option<AudioParams>,
    progress: bool,
}

impl EncodeArgs {
    pub fn new(source: &Path, destination: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            size: None,
            video_bitrate: None,
            frame_rate: None,
            key_frame_interval_secs: None,
            audio: None,
            progress: false,
        }
    }

    /// Scale to `width`x`height`, rounded down to even dimensions.
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((even(width), even(height)));
        self
    }

    pub fn video_bitrate(mut self, bps: u32) -> Self {
        self.video_bitrate = Some(bps);
        self
    }

    pub fn frame_rate(mut self, fps: Option<u32>) -> Self {
        self.frame_rate = fps.filter(|f| *f > 0);
        self
    }

    pub fn key_frame_interval(mut self, secs: u32) -> Self {
        self.key_frame_interval_secs = Some(secs).filter(|s| *s > 0);
        self
    }

    pub fn audio(mut self, audio: AudioParams) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Emit machine-readable `-progress` blocks on stderr.
    pub fn with_progress(mut self) -> Self {
        self.progress = true;
        self
    }

    /// Render the argument list (without the program name).
    pub fn build(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-y".into()];
        if self.progress {
            args.extend(["-progress", "pipe:2", "-nostats"].map(String::from));
        } else {
            args.extend(["-loglevel", "error"].map(String::from));
        }

        args.push("-i".into());
        args.push(self.source.to_string_lossy().into_owned());
        // Audio is optional in the source.
        args.extend(["-map", "0:v:0", "-map", "0:a:0?"].map(String::from));

        args.extend(["-c:v", "libx264", "-preset", "veryfast", "-pix_fmt", "yuv420p"].map(String::from));
        if let Some(bps) = self.video_bitrate {
            args.push("-b:v".into());
            args.push(bps.to_string());
        }

        let mut filters = Vec::new();
        if let Some((w, h)) = self.size {
            filters.push(format!("scale={w}:{h}"));
        }
        if let Some(fps) = self.frame_rate {
            filters.push(format!("fps={fps}"));
        }
        if !filters.is_empty() {
            args.push("-vf".into());
            args.push(filters.join(","));
        }

        if let Some(secs) = self.key_frame_interval_secs {
            args.push("-force_key_frames".into());
            args.push(format!("expr:gte(t,n_forced*{secs})"));
        }

        args.extend(["-c:a", "aac"].map(String::from));
        if let Some(audio) = self.audio {
            args.push("-b:a".into());
            args.push(audio.bitrate.to_string());
            if let Some(channels) = audio.channels {
                args.push("-ac".into());
                args.push(channels.to_string());
            }
            if let Some(rate) = audio.sample_rate {
                args.push("-ar".into());
                args.push(rate.to_string());
            }
        }

        args.extend(["-f", "mp4", "-movflags", "+faststart"].map(String::from));
        args.push(self.destination.to_string_lossy().into_owned());
        args
    }
}

/// libx264 rejects odd dimensions.
fn even(v: u32) -> u32 {
    (v & !1).max(2)
}

/// Run an encode, handing every completed `-progress` block to
/// `on_progress`. `duration_secs` is the source duration used for the ratio.
pub async fn run_encode(
    ffmpeg: &Path,
    args: &EncodeArgs,
    duration_secs: Option<f64>,
    mut on_progress: impl FnMut(EncodeProgress),
    cancel: &CancellationToken,
) -> cs_core::Result<()> {
    let mut cmd = ToolCommand::new(ffmpeg.to_path_buf());
    cmd.args(args.build());
    cmd.timeout(ENCODE_TIMEOUT);

    let mut parser = ProgressParser::new(duration_secs);
    cmd.execute_streaming(
        |line| {
            if let Some(snapshot) = parser.feed(line) {
                on_progress(snapshot);
            }
        },
        cancel,
    )
    .await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn full_command_line() {
        let args = EncodeArgs::new(Path::new("/c/input.bin"), Path::new("/c/output.mp4"))
            .size(960, 540)
            .video_bitrate(300_000)
            .frame_rate(Some(15))
            .key_frame_interval(10)
            .audio(AudioParams {
                bitrate: 60_000,
                channels: Some(1),
                sample_rate: Some(44_100),
            })
            .with_progress()
            .build();

        assert_eq!(args[position(&args, "-i") + 1], "/c/input.bin");
        assert_eq!(args[position(&args, "-progress") + 1], "pipe:2");
        assert_eq!(args[position(&args, "-c:v") + 1], "libx264");
        assert_eq!(args[position(&args, "-b:v") + 1], "300000");
        assert_eq!(args[position(&args, "-vf") + 1], "scale=960:540,fps=15");
        assert_eq!(args[position(&args, "-force_key_frames") + 1], "expr:gte(t,n_forced*10)");
        assert_eq!(args[position(&args, "-b:a") + 1], "60000");
        assert_eq!(args[position(&args, "-ac") + 1], "1");
        assert_eq!(args[position(&args, "-ar") + 1], "44100");
        assert_eq!(args[position(&args, "-f") + 1], "mp4");
        assert_eq!(args.last().unwrap(), "/c/output.mp4");
    }

    #[test]
    fn dimensions_are_made_even() {
        let args = EncodeArgs::new(Path::new("a"), Path::new("b")).size(959, 409).build();
        assert_eq!(args[position(&args, "-vf") + 1], "scale=958:408");
        assert_eq!(even(1), 2);
    }

    #[test]
    fn minimal_command_omits_optional_flags() {
        let args = EncodeArgs::new(Path::new("a"), Path::new("b"))
            .frame_rate(Some(0))
            .key_frame_interval(0)
            .build();
        for flag in ["-vf", "-b:v", "-force_key_frames", "-b:a", "-progress"] {
            assert!(!args.iter().any(|a| a == flag), "unexpected {flag}");
        }
        assert!(args.iter().any(|a| a == "+faststart"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_encode_streams_progress() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = testing::script(dir.path(), testing::ENCODES);
        let dest = dir.path().join("out.mp4");
        let args = EncodeArgs::new(Path::new("in.bin"), &dest).with_progress();

        let mut seen = Vec::new();
        run_encode(&ffmpeg, &args, Some(4.0), |p| seen.push(p.ratio), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(seen, vec![Some(0.25), Some(1.0)]);
        assert_eq!(std::fs::read(&dest).unwrap(), b"encoded");
    }
}
