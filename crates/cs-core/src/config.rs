//! Engine configuration.
//!
//! The top-level [`Config`] is deserialized from JSON. Every section defaults
//! sensibly so a completely empty `{}` file is valid. Per-backend encoder
//! tuning is deliberately absent: each backend carries a fixed profile.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::media::SizingLimits;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub sizing: SizingConfig,
    pub cache: CacheConfig,
    pub progress: ProgressConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None`, the file does not exist or it cannot be parsed.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.sizing.longer_edge_cap == 0 || self.sizing.shorter_edge_cap == 0 {
            warnings.push("sizing caps of 0 produce degenerate output".into());
        }
        if self.sizing.longer_edge_cap < self.sizing.shorter_edge_cap {
            warnings.push(format!(
                "sizing.longer_edge_cap ({}) is smaller than sizing.shorter_edge_cap ({})",
                self.sizing.longer_edge_cap, self.sizing.shorter_edge_cap
            ));
        }
        if self.sizing.limit_bps == 0 {
            warnings.push("sizing.limit_bps is 0; every file above the small-file floor will be transcoded".into());
        }
        if self.progress.throttle_ms == 0 {
            warnings.push("progress.throttle_ms is 0; progress updates will not be throttled".into());
        }

        for (name, path) in [
            ("ffmpeg_path", &self.tools.ffmpeg_path),
            ("ffprobe_path", &self.tools.ffprobe_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!(
                        "tools.{name} {} does not exist; falling back to PATH",
                        p.display()
                    ));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Output size caps and the bitrate ceiling used by the skip heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub longer_edge_cap: u32,
    pub shorter_edge_cap: u32,
    pub limit_bps: u64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            longer_edge_cap: 960,
            shorter_edge_cap: 540,
            limit_bps: 1_800_000,
        }
    }
}

impl SizingConfig {
    pub fn limits(&self) -> SizingLimits {
        SizingLimits::new(self.longer_edge_cap, self.shorter_edge_cap)
    }
}

/// Location of the private cache directory that holds job temp files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("clipshrink"),
        }
    }
}

/// Progress delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub throttle_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            throttle_ms: crate::progress::DEFAULT_THROTTLE.as_millis() as u64,
        }
    }
}

impl ProgressConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.sizing.longer_edge_cap, 960);
        assert_eq!(cfg.sizing.shorter_edge_cap, 540);
        assert_eq!(cfg.sizing.limit_bps, 1_800_000);
        assert_eq!(cfg.progress.interval(), Duration::from_secs(1));
        assert!(cfg.cache.dir.ends_with("clipshrink"));
        assert!(cfg.tools.ffmpeg_path.is_none());
    }

    #[test]
    fn default_config_no_warnings() {
        let cfg = Config::default();
        let warnings = cfg.validate();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
    }

    #[test]
    fn swapped_caps_warn() {
        let mut cfg = Config::default();
        cfg.sizing.longer_edge_cap = 360;
        cfg.sizing.shorter_edge_cap = 640;
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("longer_edge_cap")));
    }

    #[test]
    fn missing_tool_override_warns() {
        let mut cfg = Config::default();
        cfg.tools.ffmpeg_path = Some(PathBuf::from("/nonexistent/ffmpeg"));
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("ffmpeg_path")));
    }

    #[test]
    fn zero_throttle_warns() {
        let mut cfg = Config::default();
        cfg.progress.throttle_ms = 0;
        assert!(cfg.validate().iter().any(|w| w.contains("throttle_ms")));
    }

    #[test]
    fn parse_json_config() {
        let json = r#"{"sizing": {"longer_edge_cap": 640, "shorter_edge_cap": 360}, "cache": {"dir": "/tmp/cs"}}"#;
        let cfg = Config::from_json(json).unwrap();
        assert_eq!(cfg.sizing.limits(), SizingLimits::new(640, 360));
        assert_eq!(cfg.sizing.limit_bps, 1_800_000);
        assert_eq!(cfg.cache.dir, PathBuf::from("/tmp/cs"));
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.sizing.limits(), SizingLimits::default());
        assert_eq!(cfg.progress.throttle_ms, 1000);
    }

    #[test]
    fn parse_invalid_json_is_config_error() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn load_or_default_with_none() {
        let cfg = Config::load_or_default(None);
        assert_eq!(cfg.sizing.longer_edge_cap, 960);
    }

    #[test]
    fn load_or_default_with_missing_file() {
        let cfg = Config::load_or_default(Some(Path::new("/nonexistent/config.json")));
        assert_eq!(cfg.sizing.longer_edge_cap, 960);
    }

    #[test]
    fn load_or_default_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clipshrink.json");
        std::fs::write(&path, r#"{"progress": {"throttle_ms": 250}}"#).unwrap();
        let cfg = Config::load_or_default(Some(&path));
        assert_eq!(cfg.progress.interval(), Duration::from_millis(250));
    }
}
