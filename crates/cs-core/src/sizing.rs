//! Downscale-only sizing policy.

use crate::media::Resolution;

/// Compute the output frame size for `input` under orientation-independent
/// caps.
///
/// The caps are matched to the input's orientation, the binding edge is
/// scaled to exactly its cap and the free edge follows the input aspect.
/// Inputs that already fit are returned unchanged. A degenerate input (either
/// edge zero) yields `longer_cap x shorter_cap`.
pub fn scale_to(input: Resolution, longer_cap: u32, shorter_cap: u32) -> Resolution {
    if input.width < 1 || input.height < 1 {
        return Resolution::new(longer_cap, shorter_cap);
    }

    let in_w = input.width as f64;
    let in_h = input.height as f64;
    let in_aspect = in_w / in_h;

    let (cap_w, cap_h) = if in_aspect >= 1.0 {
        (longer_cap, shorter_cap)
    } else {
        (shorter_cap, longer_cap)
    };
    let cap_aspect = cap_w as f64 / cap_h as f64;

    if in_aspect >= cap_aspect {
        let scale = cap_w as f64 / in_w;
        if scale >= 1.0 {
            return input;
        }
        Resolution::new(cap_w, round_half_up(scale * in_h).min(cap_h))
    } else {
        let scale = cap_h as f64 / in_h;
        if scale >= 1.0 {
            return input;
        }
        Resolution::new(round_half_up(scale * in_w).min(cap_w), cap_h)
    }
}

fn round_half_up(value: f64) -> u32 {
    (value + 0.5) as u32
}
