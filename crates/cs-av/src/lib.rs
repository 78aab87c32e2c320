//! # cs-av
//!
//! External tools and the transcoding backends for clipshrink.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- locate ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout,
//!   stderr line streaming and cancellation.
//! - **Progress parsing** ([`ProgressParser`]) -- ffmpeg `-progress` blocks to
//!   ratios.
//! - **Probe backend** ([`FfprobeProber`]) -- implements [`cs_probe::Prober`]
//!   by shelling out to ffprobe.
//! - **Workspace management** ([`Workspace`]) -- job temp files in the cache
//!   directory with guaranteed cleanup.
//! - **Backends** ([`backends`]) -- the [`Transcode`] capability and its
//!   transform, strategy and compressor variants.

pub mod backends;
pub mod command;
pub mod probe;
pub mod progress;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use backends::compressor::{Compressor, CompressorBackend};
pub use backends::strategy::{StrategyBackend, StrategyTranscoder};
pub use backends::transform::{TransformBackend, TransformEngine};
pub use backends::{start, BackendJob, BackendKind, BackendOutput, Transcode, TranscodeHandle};
pub use command::{ToolCommand, ToolOutput};
pub use probe::FfprobeProber;
pub use progress::{EncodeProgress, ProgressParser};
pub use tools::{ToolConfig, ToolRegistry};
pub use workspace::Workspace;
