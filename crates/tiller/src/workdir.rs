//! Per-session working directories.
//!
//! Each session exclusively owns one directory across all of its turns.
//! Managed directories live under the data dir and are removed on release;
//! adopted (externally supplied) directories are left alone. Creation and
//! cleanup failures are logged and non-fatal.

use std::io;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use log::{debug, warn};

#[derive(Debug, Clone)]
struct Workdir {
    path: PathBuf,
    managed: bool,
}

pub struct WorkdirManager {
    root: PathBuf,
    dirs: DashMap<String, Workdir>,
}

impl WorkdirManager {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("workdirs"),
            dirs: DashMap::new(),
        }
    }

    /// Bind an externally supplied directory to the session. Never removed
    /// on release.
    pub fn adopt(&self, session_id: &str, path: PathBuf) {
        self.dirs.insert(
            session_id.to_string(),
            Workdir {
                path,
                managed: false,
            },
        );
    }

    /// Create-once, reuse: return the session's directory, creating a
    /// managed one under the data dir on first call.
    pub fn acquire(&self, session_id: &str) -> io::Result<PathBuf> {
        if let Some(existing) = self.dirs.get(session_id) {
            return Ok(existing.path.clone());
        }
        let path = self.root.join(session_id);
        std::fs::create_dir_all(&path)?;
        debug!("created workdir {} for {session_id}", path.display());
        self.dirs.insert(
            session_id.to_string(),
            Workdir {
                path: path.clone(),
                managed: true,
            },
        );
        Ok(path)
    }

    pub fn get(&self, session_id: &str) -> Option<PathBuf> {
        self.dirs.get(session_id).map(|w| w.path.clone())
    }

    /// Release the session's directory, removing it if managed.
    /// Best-effort: failures are logged, never fatal.
    pub fn release(&self, session_id: &str) {
        let Some((_, workdir)) = self.dirs.remove(session_id) else {
            return;
        };
        if !workdir.managed {
            return;
        }
        if let Err(err) = std::fs::remove_dir_all(&workdir.path) {
            warn!(
                "failed to remove workdir {} for {session_id}: {err}",
                workdir.path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_creates_once_and_reuses() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = WorkdirManager::new(tmp.path());

        let first = manager.acquire("sess_a").unwrap();
        let second = manager.acquire("sess_a").unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[test]
    fn test_release_removes_managed_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = WorkdirManager::new(tmp.path());

        let path = manager.acquire("sess_a").unwrap();
        manager.release("sess_a");
        assert!(!path.exists());
        assert!(manager.get("sess_a").is_none());
    }

    #[test]
    fn test_release_keeps_adopted_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let external = tempfile::tempdir().unwrap();
        let manager = WorkdirManager::new(tmp.path());

        manager.adopt("sess_a", external.path().to_path_buf());
        assert_eq!(manager.acquire("sess_a").unwrap(), external.path());
        manager.release("sess_a");
        assert!(external.path().exists());
    }

    #[test]
    fn test_release_unknown_session_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = WorkdirManager::new(tmp.path());
        manager.release("sess_missing");
    }
}
