// ABOUTME: Typed error taxonomy for the table move workflow
// ABOUTME: Each fatal error is tagged with the stage that produced it

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One discrete step of a backup job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Export,
    Rewrite,
    Apply,
    Cleanup,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Export => "export",
            Stage::Rewrite => "rewrite",
            Stage::Apply => "apply",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job identifiers rejected before any stage runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidJob {
    #[error("invalid {kind} '{value}': {reason}")]
    Identifier {
        kind: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("source and target schema are both '{0}'")]
    SameSchema(String),
}

/// Fatal errors returned by [`crate::mover::move_table`]
///
/// The first failing stage wins. Cleanup problems never show up here; they
/// are downgraded to [`CleanupWarning`]s.
#[derive(Debug, Error)]
pub enum MoveError {
    #[error("export failed: {cause}")]
    Export { cause: String },

    #[error("rewrite failed for {}: {source}", .path.display())]
    Rewrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rewrite failed: {} contains no occurrence of '{pattern}'", .path.display())]
    NothingToRewrite { path: PathBuf, pattern: String },

    /// The target may hold a partial copy of the table when this is returned
    #[error(
        "apply failed: {cause}\n\
         The target schema may be partially updated; statements that ran before \
         the failure were not rolled back. Re-running the job is not idempotent \
         until the target table is inspected or dropped."
    )]
    Apply { cause: String },
}

impl MoveError {
    /// Stage that produced the error
    pub fn stage(&self) -> Stage {
        match self {
            MoveError::Export { .. } => Stage::Export,
            MoveError::Rewrite { .. } | MoveError::NothingToRewrite { .. } => Stage::Rewrite,
            MoveError::Apply { .. } => Stage::Apply,
        }
    }

    pub fn is_export(&self) -> bool {
        matches!(self, MoveError::Export { .. })
    }

    pub fn is_rewrite(&self) -> bool {
        matches!(
            self,
            MoveError::Rewrite { .. } | MoveError::NothingToRewrite { .. }
        )
    }

    pub fn is_apply(&self) -> bool {
        matches!(self, MoveError::Apply { .. })
    }
}

/// Non-fatal problem deleting an artifact
#[derive(Debug, Error)]
#[error("failed to remove {}: {source}", .path.display())]
pub struct CleanupWarning {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
