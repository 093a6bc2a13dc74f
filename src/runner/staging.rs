//! Writing submitted source to disk before execution.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{Result, RunnerError};

/// Base name of every staged source file.
pub const SOURCE_STEM: &str = "code";

/// Base name of the compiled output binary.
pub const BINARY_STEM: &str = "program";

/// How staging paths are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StagingMode {
    /// One fixed path per extension directly under the temp root.
    ///
    /// Concurrent requests for the same language overwrite each other's
    /// source, and all compiled languages share one binary path.
    Shared,
    /// A fresh directory per request, removed once the request finishes.
    #[default]
    Isolated,
}

impl std::str::FromStr for StagingMode {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shared" => Ok(StagingMode::Shared),
            "isolated" => Ok(StagingMode::Isolated),
            other => Err(RunnerError::Config(format!(
                "unknown staging mode {:?} (expected \"shared\" or \"isolated\")",
                other
            ))),
        }
    }
}

/// A source file written to disk, plus the path a compiler should emit to.
///
/// In isolated mode the backing directory is deleted when this is dropped.
#[derive(Debug)]
pub struct StagedSource {
    source_path: PathBuf,
    binary_path: PathBuf,
    workspace: Option<TempDir>,
}

impl StagedSource {
    /// Write `code` verbatim to `<dir>/code.<extension>`.
    pub async fn stage(
        mode: StagingMode,
        temp_root: &Path,
        extension: &str,
        code: &str,
    ) -> Result<Self> {
        let (dir, workspace) = match mode {
            StagingMode::Shared => (temp_root.to_path_buf(), None),
            StagingMode::Isolated => {
                let workspace = tempfile::Builder::new()
                    .prefix("run-")
                    .tempdir_in(temp_root)
                    .map_err(|source| RunnerError::Staging {
                        path: temp_root.to_path_buf(),
                        source,
                    })?;
                (workspace.path().to_path_buf(), Some(workspace))
            }
        };

        let source_path = dir.join(format!("{}.{}", SOURCE_STEM, extension));
        let binary_path = dir.join(format!("{}{}", BINARY_STEM, std::env::consts::EXE_SUFFIX));

        tokio::fs::write(&source_path, code.as_bytes())
            .await
            .map_err(|source| RunnerError::Staging {
                path: source_path.clone(),
                source,
            })?;

        tracing::debug!(path = %source_path.display(), bytes = code.len(), "staged source");

        Ok(Self {
            source_path,
            binary_path,
            workspace,
        })
    }

    /// Path of the staged source file.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Path a compiler should write its output binary to.
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Whether this staging lives in its own request-scoped directory.
    pub fn is_isolated(&self) -> bool {
        self.workspace.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shared_paths_are_fixed() {
        let root = tempfile::tempdir().unwrap();

        let first = StagedSource::stage(StagingMode::Shared, root.path(), "py", "print(1)")
            .await
            .unwrap();
        let second = StagedSource::stage(StagingMode::Shared, root.path(), "py", "print(2)")
            .await
            .unwrap();

        assert_eq!(first.source_path(), root.path().join("code.py"));
        assert_eq!(first.source_path(), second.source_path());
        assert_eq!(first.binary_path(), second.binary_path());
        assert!(!first.is_isolated());

        let on_disk = std::fs::read_to_string(root.path().join("code.py")).unwrap();
        assert_eq!(on_disk, "print(2)");
    }

    #[tokio::test]
    async fn test_isolated_paths_are_unique_and_cleaned() {
        let root = tempfile::tempdir().unwrap();

        let first = StagedSource::stage(StagingMode::Isolated, root.path(), "js", "a")
            .await
            .unwrap();
        let second = StagedSource::stage(StagingMode::Isolated, root.path(), "js", "b")
            .await
            .unwrap();

        assert_ne!(first.source_path(), second.source_path());
        assert_ne!(first.binary_path(), second.binary_path());
        assert!(first.is_isolated());

        let dir = first.source_path().parent().unwrap().to_path_buf();
        assert!(dir.exists());
        drop(first);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_code_is_written_verbatim() {
        let root = tempfile::tempdir().unwrap();
        let code = "line one\r\nline two without newline";

        let staged = StagedSource::stage(StagingMode::Isolated, root.path(), "txt", code)
            .await
            .unwrap();

        let on_disk = std::fs::read(staged.source_path()).unwrap();
        assert_eq!(on_disk, code.as_bytes());
    }

    #[tokio::test]
    async fn test_missing_root_fails_staging() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("does-not-exist");

        for mode in [StagingMode::Shared, StagingMode::Isolated] {
            let err = StagedSource::stage(mode, &missing, "py", "print(1)")
                .await
                .unwrap_err();
            assert!(err.is_staging(), "{:?} should fail staging", mode);
        }
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("shared".parse::<StagingMode>().unwrap(), StagingMode::Shared);
        assert_eq!("isolated".parse::<StagingMode>().unwrap(), StagingMode::Isolated);
        assert!("Shared".parse::<StagingMode>().is_err());
    }
}
