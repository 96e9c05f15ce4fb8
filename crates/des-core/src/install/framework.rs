use crate::error::{DesError, Result};
use crate::paths::{FRAMEWORK_AGENTS_DIR, FRAMEWORK_DIR, FRAMEWORK_SKILLS_DIR, FRAMEWORK_TASKS_DIR};
use std::path::{Path, PathBuf};

pub const FRAMEWORK_ENV: &str = "NWAVE_FRAMEWORK_DIR";

/// Root directory that contains the `nWave/` framework tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkSource {
    root: PathBuf,
}

impl FrameworkSource {
    /// Resolve the framework source.
    ///
    /// Priority: the explicit `--source` path, then `NWAVE_FRAMEWORK_DIR`,
    /// then the nearest ancestor of `cwd` that holds an `nWave/` directory.
    pub fn locate(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::at(path);
        }
        if let Ok(value) = std::env::var(FRAMEWORK_ENV) {
            if !value.trim().is_empty() {
                return Self::at(Path::new(value.trim()));
            }
        }
        cwd.ancestors()
            .find(|dir| dir.join(FRAMEWORK_DIR).is_dir())
            .map(|dir| FrameworkSource {
                root: dir.to_path_buf(),
            })
            .ok_or_else(|| {
                DesError::FrameworkNotFound(format!(
                    "no {FRAMEWORK_DIR}/ directory above {}; pass --source or set {FRAMEWORK_ENV}",
                    cwd.display()
                ))
            })
    }

    /// Accept `path` only if it actually contains `nWave/`.
    pub fn at(path: &Path) -> Result<Self> {
        if path.join(FRAMEWORK_DIR).is_dir() {
            Ok(FrameworkSource {
                root: path.to_path_buf(),
            })
        } else {
            Err(DesError::FrameworkNotFound(format!(
                "{} has no {FRAMEWORK_DIR}/ directory",
                path.display()
            )))
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.root.join(FRAMEWORK_AGENTS_DIR)
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.root.join(FRAMEWORK_SKILLS_DIR)
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join(FRAMEWORK_TASKS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn searches_upward_from_cwd() {
        std::env::remove_var(FRAMEWORK_ENV);
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nWave/agents")).unwrap();
        let nested = dir.path().join("packages/tool/src");
        std::fs::create_dir_all(&nested).unwrap();

        let source = FrameworkSource::locate(None, &nested).unwrap();
        assert_eq!(source.root(), dir.path());
        assert_eq!(source.agents_dir(), dir.path().join("nWave/agents"));
    }

    #[test]
    #[serial]
    fn explicit_path_wins_over_env() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        std::fs::create_dir_all(a.path().join("nWave")).unwrap();
        std::fs::create_dir_all(b.path().join("nWave")).unwrap();

        std::env::set_var(FRAMEWORK_ENV, b.path());
        let source = FrameworkSource::locate(Some(a.path()), a.path()).unwrap();
        assert_eq!(source.root(), a.path());

        let source = FrameworkSource::locate(None, a.path()).unwrap();
        assert_eq!(source.root(), b.path());
        std::env::remove_var(FRAMEWORK_ENV);
    }

    #[test]
    #[serial]
    fn missing_framework_is_reported() {
        std::env::remove_var(FRAMEWORK_ENV);
        let dir = TempDir::new().unwrap();
        let err = FrameworkSource::at(dir.path()).unwrap_err();
        assert!(matches!(err, DesError::FrameworkNotFound(_)));
    }
}
