//! The [`Prober`] trait defining the interface for media file probing.

use std::path::Path;

use cs_core::MediaMetadata;

/// A media file prober capable of extracting metadata from video files.
///
/// Implementations must be safe to share across threads (`Send + Sync`).
/// Probing is blocking; async callers should run it on a blocking thread.
pub trait Prober: Send + Sync {
    /// Human-readable name identifying this prober implementation.
    fn name(&self) -> &'static str;

    /// Probe a media file at the given path and extract metadata.
    ///
    /// Fails with [`cs_core::Error::Probe`] when the file cannot be opened or
    /// has no decodable video track.
    fn probe(&self, path: &Path) -> cs_core::Result<MediaMetadata>;

    /// Check whether this prober is worth trying on the given file.
    ///
    /// A return value of `true` does not guarantee that [`Prober::probe`]
    /// will succeed.
    fn supports(&self, path: &Path) -> bool;
}
