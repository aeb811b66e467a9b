// ABOUTME: Removal of transient artifacts on every exit path
// ABOUTME: A drop guard backs up the explicit cleanup stage

use crate::error::CleanupWarning;
use crate::mover::job::ArtifactPaths;
use std::io::ErrorKind;
use std::path::Path;

/// Owns a job's artifact paths and deletes the files when done
///
/// [`cleanup`](Self::cleanup) is the normal path. If the guard is dropped
/// without it (panic, cancelled future) the files are removed in `Drop`.
#[derive(Debug)]
pub struct ArtifactGuard {
    paths: ArtifactPaths,
    cleaned: bool,
}

impl ArtifactGuard {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self {
            paths,
            cleaned: false,
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Attempt to delete both artifacts, each independently
    pub fn cleanup(&mut self) -> Vec<CleanupWarning> {
        self.cleaned = true;
        let mut warnings = Vec::new();
        for path in self.paths.all() {
            match remove_artifact(path) {
                Ok(true) => tracing::debug!("Removed {}", path.display()),
                Ok(false) => tracing::debug!("{} not present, nothing to remove", path.display()),
                Err(warning) => {
                    tracing::warn!("⚠ {}", warning);
                    warnings.push(warning);
                }
            }
        }
        warnings
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if !self.cleaned {
            let _ = self.cleanup();
        }
    }
}

/// Delete one artifact; `Ok(false)` when it did not exist
pub fn remove_artifact(path: &Path) -> Result<bool, CleanupWarning> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(CleanupWarning {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mover::job::BackupJob;

    fn paths_in(dir: &Path) -> ArtifactPaths {
        BackupJob::new("public", "public_test", "readings")
            .unwrap()
            .artifacts_in(dir)
    }

    #[test]
    fn test_cleanup_removes_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        std::fs::write(&paths.dump, "dump").unwrap();
        std::fs::write(&paths.rewritten, "sql").unwrap();

        let warnings = ArtifactGuard::new(paths.clone()).cleanup();

        assert!(warnings.is_empty());
        assert!(!paths.dump.exists());
        assert!(!paths.rewritten.exists());
    }

    #[test]
    fn test_missing_artifacts_are_not_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        std::fs::write(&paths.dump, "dump").unwrap();

        let warnings = ArtifactGuard::new(paths.clone()).cleanup();

        assert!(warnings.is_empty());
        assert!(!paths.dump.exists());
    }

    #[test]
    fn test_drop_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        std::fs::write(&paths.dump, "dump").unwrap();
        std::fs::write(&paths.rewritten, "sql").unwrap();

        {
            let _guard = ArtifactGuard::new(paths.clone());
        }

        assert!(!paths.dump.exists());
        assert!(!paths.rewritten.exists());
    }

    #[test]
    fn test_undeletable_artifact_is_warning() {
        let dir = tempfile::tempdir().unwrap();
        let paths = paths_in(dir.path());
        // A directory where a file is expected cannot be removed with remove_file
        std::fs::create_dir(&paths.rewritten).unwrap();
        std::fs::write(&paths.dump, "dump").unwrap();

        let warnings = ArtifactGuard::new(paths.clone()).cleanup();

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, paths.rewritten);
        assert!(!paths.dump.exists());
    }
}
