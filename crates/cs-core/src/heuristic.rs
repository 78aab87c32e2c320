//! Re-encode skip heuristic.

use crate::error::{Error, Result};
use crate::media::{MediaMetadata, Resolution, MIN_TRUSTED_DURATION_SECS};

/// Files smaller than this are never worth re-encoding.
pub const TRIVIALLY_SMALL_BYTES: i64 = 500_000;

/// Decide whether `info` has to be transcoded to satisfy `output` and
/// `limit_bps`.
///
/// Rules are evaluated in order and short-circuit:
///
/// 1. files under [`TRIVIALLY_SMALL_BYTES`] never need a transcode;
/// 2. a resize always needs a transcode;
/// 3. an unknown or near-zero duration needs a transcode, since no bitrate
///    estimate can be trusted;
/// 4. otherwise transcode only when the average bitrate exceeds `limit_bps`.
///
/// # Errors
///
/// Returns [`Error::Heuristic`] when `file_size_bytes` is not positive.
pub fn needs_transcode(
    info: &MediaMetadata,
    file_size_bytes: i64,
    output: Resolution,
    limit_bps: u64,
) -> Result<bool> {
    if file_size_bytes <= 0 {
        return Err(Error::Heuristic(format!(
            "file size must be positive, got {file_size_bytes}"
        )));
    }

    if file_size_bytes < TRIVIALLY_SMALL_BYTES {
        return Ok(false);
    }

    if output != info.resolution() {
        return Ok(true);
    }

    let duration = match info.duration_secs {
        Some(d) if d >= MIN_TRUSTED_DURATION_SECS => d,
        _ => return Ok(true),
    };

    let actual_bps = file_size_bytes as f64 * 8.0 / duration;
    Ok(actual_bps > limit_bps as f64)
}
