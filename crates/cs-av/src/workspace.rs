//! Job workspace: temp files in the private cache directory.
//!
//! A [`Workspace`] hands out uniquely named files inside the cache directory
//! and remembers every path it created. When the job ends,
//! [`Workspace::release`] deletes all of them except the file that became the
//! job's result. Dropping a workspace without releasing it deletes
//! everything.

use std::path::{Path, PathBuf};

/// Temp-file owner for a single job.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    owned: Vec<PathBuf>,
}

impl Workspace {
    /// Open a workspace in `cache_dir`, creating the directory on demand.
    pub fn create(cache_dir: &Path) -> cs_core::Result<Self> {
        std::fs::create_dir_all(cache_dir)?;
        Ok(Self {
            dir: cache_dir.to_path_buf(),
            owned: Vec::new(),
        })
    }

    /// The cache directory backing this workspace.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create an empty, uniquely named file such as `input1a2b3c.bin`.
    pub fn temp_file(&mut self, prefix: &str, suffix: &str) -> cs_core::Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(&self.dir)?;
        let (_, path) = file.keep().map_err(std::io::Error::from)?;
        self.owned.push(path.clone());
        Ok(path)
    }

    /// Take ownership of a path created elsewhere so it is cleaned up with the
    /// rest of the workspace.
    pub fn adopt(&mut self, path: PathBuf) {
        if !self.owned.contains(&path) {
            self.owned.push(path);
        }
    }

    /// Delete every owned file except `keep`, which passes to the caller.
    ///
    /// Paths are compared canonically so a result reached through a different
    /// spelling of the same path is still recognised. Returns the paths that
    /// were removed.
    pub fn release(mut self, keep: Option<&Path>) -> Vec<PathBuf> {
        let keep = keep.map(canonical);
        let owned = std::mem::take(&mut self.owned);

        owned
            .into_iter()
            .filter(|path| keep.as_ref() != Some(&canonical(path)))
            .filter(|path| remove_if_exists(path))
            .collect()
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        for path in self.owned.drain(..) {
            remove_if_exists(&path);
        }
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Best-effort delete. Failures are logged, never returned, so they cannot
/// mask the error that triggered the cleanup. Returns whether a file was
/// removed.
pub fn remove_if_exists(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed temp file");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove file");
            false
        }
    }
}

/// Move `from` to `to`, replacing `to`.
///
/// Tries a rename first (same filesystem) and falls back to copy + remove.
pub fn move_file(from: &Path, to: &Path) -> cs_core::Result<()> {
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to)?;
        remove_if_exists(from);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn create_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let cache = root.path().join("fileProvider");
        Workspace::create(&cache).unwrap();
        let ws = Workspace::create(&cache).unwrap();
        assert!(cache.is_dir());
        assert_eq!(ws.dir(), cache);
    }

    #[test]
    fn temp_files_are_unique_and_inside_cache() {
        let root = tempfile::tempdir().unwrap();
        let mut ws = Workspace::create(root.path()).unwrap();
        let a = ws.temp_file("input", ".bin").unwrap();
        let b = ws.temp_file("input", ".bin").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with(root.path()));
        assert!(a.exists());
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("input") && name.ends_with(".bin"), "{name}");
    }

    #[test]
    fn release_keeps_only_the_result() {
        let root = tempfile::tempdir().unwrap();
        let mut ws = Workspace::create(root.path()).unwrap();
        let input = ws.temp_file("input", ".bin").unwrap();
        let output = ws.temp_file("output", ".mp4").unwrap();

        // Same file spelled differently.
        let alias = root.path().join(".").join(output.file_name().unwrap());
        let removed = ws.release(Some(&alias));

        assert_eq!(removed, vec![input.clone()]);
        assert!(!input.exists());
        assert!(output.exists());
    }

    #[test]
    fn release_without_result_removes_everything() {
        let root = tempfile::tempdir().unwrap();
        let mut ws = Workspace::create(root.path()).unwrap();
        let input = ws.temp_file("input", ".bin").unwrap();
        let adopted = root.path().join("VIDEO_1.mp4");
        fs::write(&adopted, b"x").unwrap();
        ws.adopt(adopted.clone());

        ws.release(None);
        assert!(!input.exists());
        assert!(!adopted.exists());
    }

    #[test]
    fn drop_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let mut ws = Workspace::create(root.path()).unwrap();
            ws.temp_file("output", ".mp4").unwrap()
        };
        assert!(!path.exists());
    }

    #[test]
    fn missing_files_are_not_errors() {
        assert!(!remove_if_exists(Path::new("/nonexistent/clipshrink/file.mp4")));
    }

    #[test]
    fn move_file_replaces_destination() {
        let root = tempfile::tempdir().unwrap();
        let from = root.path().join("from.mp4");
        let to = root.path().join("to.mp4");
        fs::write(&from, b"encoded").unwrap();
        fs::write(&to, b"").unwrap();

        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"encoded");
    }
}
