//! Locating ffmpeg and ffprobe.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cs_core::config::ToolsConfig;

/// Upper bound for a single encode.
pub const ENCODE_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// A discovered executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub name: String,
    pub path: PathBuf,
}

/// Paths of the external tools available to the backends.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Resolve every known tool. An override from `tools_config` wins when
    /// the file exists; otherwise `PATH` is searched. Missing tools are
    /// simply absent from the registry.
    pub fn discover(tools_config: &ToolsConfig) -> Self {
        let mut registry = Self::default();

        for &name in KNOWN_TOOLS {
            let configured = match name {
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                _ => tools_config.ffprobe_path.as_deref(),
            };

            let resolved = match configured {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(tool = name, path = %p.display(), "configured tool path missing, searching PATH");
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            match resolved {
                Some(path) => {
                    tracing::debug!(tool = name, path = %path.display(), "tool discovered");
                    registry.insert(name, path);
                }
                None => tracing::debug!(tool = name, "tool not found"),
            }
        }

        registry
    }

    /// Register (or replace) a tool at an explicit path.
    pub fn insert(&mut self, name: &str, path: PathBuf) {
        self.tools.insert(
            name.to_string(),
            ToolConfig {
                name: name.to_string(),
                path,
            },
        );
    }

    pub fn with_tool(mut self, name: &str, path: impl AsRef<Path>) -> Self {
        self.insert(name, path.as_ref().to_path_buf());
        self
    }

    /// Look up `name`, failing with [`cs_core::Error::Tool`] when discovery
    /// did not find it.
    pub fn require(&self, name: &str) -> cs_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            cs_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Names of the tools that were found, sorted.
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
