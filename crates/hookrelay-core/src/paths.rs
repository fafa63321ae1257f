//! File system paths for hookrelay.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths for hookrelay runtime files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for runtime files (~/.hookrelay)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.hookrelay`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".hookrelay"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.hookrelay).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.hookrelay/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the database file path (~/.hookrelay/hookrelay.sqlite).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("hookrelay.sqlite")
    }

    /// Ensure the base directory exists.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-hookrelay");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.database_file(), base.join("hookrelay.sqlite"));
    }

    #[test]
    fn test_paths_default_under_home() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();

        assert_eq!(paths.base_dir(), &home.join(".hookrelay"));
    }

    #[test]
    fn test_ensure_dirs_creates_directory() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("hookrelay");
        let paths = Paths::with_base_dir(base.clone());

        assert!(!base.exists());

        paths.ensure_dirs().unwrap();

        assert!(base.exists());
        assert!(base.is_dir());
    }

    #[test]
    fn test_ensure_dirs_idempotent() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(paths.base_dir().exists());
    }
}
