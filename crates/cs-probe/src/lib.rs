//! # cs-probe
//!
//! Media metadata probing for the transcode engine.
//!
//! The [`Prober`] trait is the seam the orchestrator depends on. This crate
//! ships an in-process [`NativeProber`] (MP4 and Matroska) and a
//! [`CompositeProber`] for layering it over tool-based probers such as the
//! ffprobe one in `cs-av`.
//!
//! ## Quick start
//!
//! ```no_run
//! use cs_probe::{NativeProber, Prober};
//! use std::path::Path;
//!
//! let prober = NativeProber::new();
//! let info = prober.probe(Path::new("clip.mp4")).unwrap();
//! println!("{}x{} rotated {}", info.width, info.height, info.rotation_degrees);
//! ```

pub mod composite;
pub mod native;
pub mod prober;

pub use composite::CompositeProber;
pub use native::NativeProber;
pub use prober::Prober;
