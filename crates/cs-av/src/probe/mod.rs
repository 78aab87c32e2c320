//! Tool-backed probe implementations.

pub mod ffprobe;

pub use ffprobe::FfprobeProber;
