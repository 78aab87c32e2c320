//! clipshrink - transcode decision and execution engine.
//!
//! Given a source video, clipshrink probes it, computes a downscale-only
//! target size, decides whether re-encoding is worth it and, if so, drives
//! one of three interchangeable backends to completion with throttled
//! progress, cooperative cancellation and guaranteed temp-file cleanup.
//!
//! The [`Engine`] wires everything together from a [`Config`]:
//!
//! ```no_run
//! use clipshrink::{BackendKind, Engine, JobRequest, ProgressSender};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! clipshrink::logging::init(false);
//! let engine = Engine::load(None).await;
//! let report = engine
//!     .run(
//!         JobRequest::from_path("/sdcard/clip.mp4", BackendKind::Strategy),
//!         ProgressSender::new(|ratio| println!("{}%", clipshrink::percent(ratio))),
//!         CancellationToken::new(),
//!     )
//!     .await;
//! println!("{}", report.outcome.status());
//! # }
//! ```

pub mod engine;
pub mod logging;

pub use cs_av::{BackendJob, BackendKind, BackendOutput, ToolRegistry, Transcode};
pub use cs_core::config::Config;
pub use cs_core::{
    needs_transcode, progress::percent, scale_to, BackendProfile, EncodingTargets, Error, JobResult, MediaMetadata,
    ProgressSender, Resolution, Result, SizingLimits,
};
pub use cs_pipeline::{
    BackendRegistry, JobHandle, JobOutcome, JobReport, JobRequest, JobSource, JobState,
    Orchestrator,
};
pub use cs_probe::Prober;
pub use engine::Engine;
