//! Parser for ffmpeg's machine-readable `-progress` output.
//!
//! ffmpeg emits blocks of `key=value` lines, each terminated by
//! `progress=continue` or, for the final block, `progress=end`.

/// Snapshot of one completed `-progress` block.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeProgress {
    /// Encoded fraction of the source, when the source duration is known.
    pub ratio: Option<f32>,
    pub out_time_us: Option<i64>,
    pub frame: Option<u64>,
    pub fps: Option<f64>,
    pub speed: Option<String>,
    /// True for the terminal `progress=end` block.
    pub ended: bool,
}

/// Incremental parser fed one stderr line at a time.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    duration_secs: Option<f64>,
    out_time_us: Option<i64>,
    frame: Option<u64>,
    fps: Option<f64>,
    speed: Option<String>,
}

impl ProgressParser {
    /// `duration_secs` is the source duration used to compute the ratio.
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| *d > 0.0),
            ..Self::default()
        }
    }

    /// Consume a line; returns a snapshot when the line closes a block.
    pub fn feed(&mut self, line: &str) -> Option<EncodeProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key {
            "out_time_us" | "out_time_ms" => {
                // Both keys carry microseconds; older ffmpeg builds only emit the
                // misnamed `out_time_ms`.
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_us = Some(us);
                }
            }
            "frame" => self.frame = value.parse().ok(),
            "fps" => self.fps = value.parse().ok(),
            "speed" => {
                self.speed = (value != "N/A").then(|| value.to_string());
            }
            "progress" => {
                let ended = value == "end";
                return Some(EncodeProgress {
                    ratio: if ended { Some(1.0) } else { self.ratio() },
                    out_time_us: self.out_time_us,
                    frame: self.frame,
                    fps: self.fps,
                    speed: self.speed.clone(),
                    ended,
                });
            }
            _ => {}
        }
        None
    }

    fn ratio(&self) -> Option<f32> {
        let duration = self.duration_secs?;
        let out_us = self.out_time_us?;
        let elapsed = out_us.max(0) as f64 / 1_000_000.0;
        Some((elapsed / duration).clamp(0.0, 1.0) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_yields_ratio() {
        let mut parser = ProgressParser::new(Some(10.0));
        assert_eq!(parser.feed("frame=120"), None);
        assert_eq!(parser.feed("fps=48.0"), None);
        assert_eq!(parser.feed("out_time_us=5000000"), None);
        assert_eq!(parser.feed("speed=2.01x"), None);
        let snapshot = parser.feed("progress=continue").unwrap();
        assert_eq!(snapshot.ratio, Some(0.5));
        assert_eq!(snapshot.frame, Some(120));
        assert_eq!(snapshot.fps, Some(48.0));
        assert_eq!(snapshot.speed.as_deref(), Some("2.01x"));
        assert!(!snapshot.ended);
    }

    #[test]
    fn end_block_is_complete() {
        let mut parser = ProgressParser::new(Some(10.0));
        parser.feed("out_time_us=9800000");
        let snapshot = parser.feed("progress=end").unwrap();
        assert!(snapshot.ended);
        assert_eq!(snapshot.ratio, Some(1.0));
    }

    #[test]
    fn unknown_duration_has_no_ratio() {
        let mut parser = ProgressParser::new(None);
        parser.feed("out_time_us=5000000");
        assert_eq!(parser.feed("progress=continue").unwrap().ratio, None);
    }

    #[test]
    fn ratio_is_clamped_and_tolerates_negative_time() {
        let mut parser = ProgressParser::new(Some(1.0));
        parser.feed("out_time_us=3000000");
        assert_eq!(parser.feed("progress=continue").unwrap().ratio, Some(1.0));
        parser.feed("out_time_us=-9223372036854775807");
        assert_eq!(parser.feed("progress=continue").unwrap().ratio, Some(0.0));
    }

    #[test]
    fn noise_lines_are_ignored() {
        let mut parser = ProgressParser::new(Some(10.0));
        assert_eq!(parser.feed("Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'in.mp4':"), None);
        assert_eq!(parser.feed("bitrate=N/A"), None);
        assert_eq!(parser.feed("speed=N/A"), None);
        assert_eq!(parser.feed("progress=continue").unwrap().speed, None);
    }
}
