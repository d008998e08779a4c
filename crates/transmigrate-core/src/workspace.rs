//! Attempt-scoped scratch directory holding a materialized candidate.

use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;

use crate::domain::{Candidate, StageError};

/// Convert a candidate-relative path into a path that cannot escape its root.
///
/// Returns `None` for absolute paths, `..` components, and empty paths.
pub fn safe_relative_path(rel: &str) -> Option<PathBuf> {
    let path = Path::new(rel);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Reasons a candidate cannot be built at all, before any tool runs.
pub fn candidate_problems(candidate: &Candidate) -> Vec<String> {
    let mut problems: Vec<String> = candidate
        .files
        .keys()
        .filter(|rel| safe_relative_path(rel).is_none())
        .map(|rel| format!("candidate file path `{}` is not a safe relative path", rel))
        .collect();
    problems.extend(
        candidate
            .missing_files()
            .into_iter()
            .map(|f| format!("candidate is missing required file `{}`", f)),
    );
    problems
}

/// Exclusive scratch directory for one attempt. Removed on drop.
#[derive(Debug)]
pub struct AttemptWorkspace {
    dir: TempDir,
    attempt: u32,
}

impl AttemptWorkspace {
    /// Write `candidate` into a fresh temporary directory.
    ///
    /// `parent` selects where the directory is created; the system temp
    /// directory is used when `None`.
    pub fn materialize(
        candidate: &Candidate,
        attempt: u32,
        parent: Option<&Path>,
    ) -> Result<Self, StageError> {
        let prefix = format!("transmigrate-attempt-{}-", attempt);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };

        for (rel, contents) in &candidate.files {
            let rel_path = safe_relative_path(rel).ok_or_else(|| {
                StageError::Internal(format!("unsafe candidate path `{}`", rel))
            })?;
            let path = dir.path().join(rel_path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, contents)?;
        }

        Ok(Self { dir, attempt })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
