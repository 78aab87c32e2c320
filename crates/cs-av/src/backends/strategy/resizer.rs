//! Composable resolution functions evaluated by the strategy engine.

use std::fmt::Debug;

use cs_core::Resolution;

/// Maps an input resolution to an output resolution.
pub trait Resizer: Debug + Send + Sync {
    fn resize(&self, input: Resolution) -> Resolution;

    /// Apply `self`, then `next`.
    fn then<R>(self, next: R) -> ChainResizer
    where
        Self: Sized + 'static,
        R: Resizer + 'static,
    {
        ChainResizer::new(vec![Box::new(self), Box::new(next)])
    }
}

impl Resizer for Box<dyn Resizer> {
    fn resize(&self, input: Resolution) -> Resolution {
        (**self).resize(input)
    }
}

/// Caps the longer and shorter edges, preserving aspect. Never upscales.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtMostResizer {
    pub shorter: u32,
    pub longer: u32,
}

impl AtMostResizer {
    pub fn new(shorter: u32, longer: u32) -> Self {
        Self { shorter, longer }
    }
}

impl Resizer for AtMostResizer {
    fn resize(&self, input: Resolution) -> Resolution {
        if input.width < 1 || input.height < 1 {
            return Resolution::new(self.longer, self.shorter);
        }

        let landscape = input.width >= input.height;
        let (cap_w, cap_h) = if landscape {
            (self.longer, self.shorter)
        } else {
            (self.shorter, self.longer)
        };

        let input_aspect = input.width as f64 / input.height as f64;
        let cap_aspect = cap_w as f64 / cap_h as f64;

        if input_aspect >= cap_aspect {
            let scale = cap_w as f64 / input.width as f64;
            if scale >= 1.0 {
                return input;
            }
            let h = ((scale * input.height as f64 + 0.5) as u32).min(cap_h);
            Resolution::new(cap_w, h)
        } else {
            let scale = cap_h as f64 / input.height as f64;
            if scale >= 1.0 {
                return input;
            }
            let w = ((scale * input.width as f64 + 0.5) as u32).min(cap_w);
            Resolution::new(w, cap_h)
        }
    }
}

/// Scales both edges by a fixed factor, never below one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FractionResizer(pub f64);

impl Resizer for FractionResizer {
    fn resize(&self, input: Resolution) -> Resolution {
        let scale = |edge: u32| ((edge as f64 * self.0 + 0.5) as u32).max(1);
        Resolution::new(scale(input.width), scale(input.height))
    }
}

/// Ignores the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactResizer(pub Resolution);

impl Resizer for ExactResizer {
    fn resize(&self, _input: Resolution) -> Resolution {
        self.0
    }
}

/// Applies its steps in order.
#[derive(Debug, Default)]
pub struct ChainResizer {
    steps: Vec<Box<dyn Resizer>>,
}

impl ChainResizer {
    pub fn new(steps: Vec<Box<dyn Resizer>>) -> Self {
        Self { steps }
    }

    pub fn push(mut self, step: impl Resizer + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }
}

impl Resizer for ChainResizer {
    fn resize(&self, input: Resolution) -> Resolution {
        self.steps.iter().fold(input, |res, step| step.resize(res))
    }

    fn then<R>(self, next: R) -> ChainResizer
    where
        Self: Sized + 'static,
        R: Resizer + 'static,
    {
        self.push(next)
    }
}
