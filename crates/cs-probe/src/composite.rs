//! Probe chains.

use std::path::Path;

use cs_core::{Error, MediaMetadata};

use crate::prober::Prober;

/// An ordered chain of probers.
///
/// The engine puts the in-process container parser first and ffprobe
/// behind it, so MP4 and Matroska never spawn a process while everything
/// else still gets probed. A prober that declines the path is skipped; one
/// that fails hands over to the next, and the last failure is what the
/// caller sees.
pub struct CompositeProber {
    chain: Vec<Box<dyn Prober>>,
}

impl CompositeProber {
    pub fn new(chain: Vec<Box<dyn Prober>>) -> Self {
        Self { chain }
    }

    /// Prober names in the order they are consulted.
    pub fn names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|p| p.name()).collect()
    }
}

impl Prober for CompositeProber {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn supports(&self, path: &Path) -> bool {
        self.chain.iter().any(|p| p.supports(path))
    }

    fn probe(&self, path: &Path) -> cs_core::Result<MediaMetadata> {
        let mut failure = None;

        for prober in self.chain.iter().filter(|p| p.supports(path)) {
            let err = match prober.probe(path) {
                Ok(info) => {
                    tracing::debug!(prober = prober.name(), path = %path.display(), "media probed");
                    return Ok(info);
                }
                Err(err) => err,
            };
            tracing::debug!(prober = prober.name(), error = %err, "probe attempt failed");
            failure = Some(err);
        }

        Err(failure.unwrap_or_else(|| {
            Error::probe(format!("no prober accepts {}", path.display()))
        }))
    }
}
