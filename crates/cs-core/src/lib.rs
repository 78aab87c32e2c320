//! cs-core: shared data model, errors, configuration, and the pure decision
//! functions of the transcode engine.
//!
//! This crate is the foundational dependency for all other cs-* crates. It
//! owns the sizing policy ([`scale_to`]) and the skip heuristic
//! ([`needs_transcode`]), both of which are pure and backend-independent,
//! plus the conflating progress channel shared by every backend.

pub mod config;
pub mod error;
pub mod heuristic;
pub mod media;
pub mod progress;
pub mod sizing;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use heuristic::needs_transcode;
pub use media::*;
pub use progress::{ProgressReporter, ProgressSender, ProgressThrottle};
pub use sizing::scale_to;
