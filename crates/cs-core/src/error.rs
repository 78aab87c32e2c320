//! Unified error type for clipshrink.
//!
//! Every crate funnels its failures into [`Error`]. The variant determines the
//! classification reported to callers via [`Error::classification`], and
//! cancellation is kept distinguishable from genuine failures through
//! [`Error::is_cancelled`].

/// Unified error type covering all failure modes of a transcode job.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input could not be opened or contains no decodable video track.
    #[error("Probe error: {0}")]
    Probe(String),

    /// The skip heuristic was handed a degenerate file size.
    #[error("Heuristic error: {0}")]
    Heuristic(String),

    /// A transcoding engine reported a failure.
    #[error("Backend error [{engine}]: {message}")]
    Backend {
        /// Name of the backend that failed.
        engine: String,
        /// Engine-specific cause.
        message: String,
    },

    /// An external tool (ffmpeg, ffprobe) could not be run to completion.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The job was cancelled by the caller or the system.
    #[error("cancelled")]
    Cancelled,

    /// An I/O operation (copy, rename, delete) failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Short classification string reported alongside a failure.
    pub fn classification(&self) -> &'static str {
        match self {
            Error::Probe(_) => "probe",
            Error::Heuristic(_) => "heuristic",
            Error::Backend { .. } | Error::Tool { .. } => "backend",
            Error::Cancelled => "cancelled",
            Error::Io { .. } => "io",
            Error::Config(_) => "config",
        }
    }

    /// Whether this value is the cancellation signal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Convenience constructor for [`Error::Probe`].
    pub fn probe(message: impl Into<String>) -> Self {
        Error::Probe(message.into())
    }

    /// Convenience constructor for [`Error::Backend`].
    pub fn backend(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Re-attribute a tool failure to the backend that ran the tool.
    ///
    /// Cancellation and non-tool errors pass through untouched.
    pub fn into_backend(self, engine: &str) -> Self {
        match self {
            Error::Tool { tool, message } => Error::Backend {
                engine: engine.to_string(),
                message: format!("{tool}: {message}"),
            },
            other => other,
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
