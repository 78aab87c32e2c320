//! # cs-pipeline
//!
//! The transcode orchestrator.
//!
//! This crate provides:
//!
//! - **[`Orchestrator`]** -- drives probe, sizing, the skip decision and a
//!   backend for one job at a time, with cancellation, throttled progress and
//!   temp-file cleanup.
//! - **[`BackendRegistry`]** -- maps the caller's [`BackendKind`] to a
//!   [`cs_av::Transcode`] implementation.
//! - **Job model** ([`job`]) -- requests, lifecycle states, outcomes and the
//!   [`JobHandle`] returned for background jobs.

pub mod job;
pub mod orchestrator;

// Re-export key types at the crate root.
pub use cs_av::BackendKind;
pub use job::{JobHandle, JobOutcome, JobReport, JobRequest, JobSource, JobState};
pub use orchestrator::{BackendRegistry, Orchestrator};
