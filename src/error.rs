use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Version-control sub-step that a [`GitFailure`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitStep {
    CreateBranch,
    Checkout,
    Stage,
    Commit,
    Push,
}

impl fmt::Display for GitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CreateBranch => "branch",
            Self::Checkout => "checkout",
            Self::Stage => "add",
            Self::Commit => "commit",
            Self::Push => "push",
        };
        f.write_str(label)
    }
}

/// A failed git invocation: which sub-step and what git reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitFailure {
    pub step: GitStep,
    pub cause: String,
}

impl GitFailure {
    pub fn new(step: GitStep, cause: impl Into<String>) -> Self {
        Self {
            step,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for GitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "git {} failed: {}", self.step, self.cause)
    }
}

#[derive(Error, Debug)]
pub enum RepeatError {
    #[error("Unknown job type {0}")]
    UnknownJobType(String),

    #[error("Repetitions must be at least 1 (got {0})")]
    InvalidRepetitions(u32),

    #[error("No travis file found at {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("Are you sure you have a project clone in {}? {reason}", .root.display())]
    NotAClone { root: PathBuf, reason: String },

    #[error("Could not find remote {0}")]
    RemoteMissing(String),

    #[error("Failed to parse manifest {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not create branch {branch}: {failure}")]
    Branch { branch: String, failure: GitFailure },

    #[error("Could not commit on branch {branch}: {failure}")]
    Git { branch: String, failure: GitFailure },

    #[error(
        "Branch {branch} was created and committed locally but not published to {remote}: {failure}. \
         Retry only the push step."
    )]
    Push {
        branch: String,
        remote: String,
        failure: GitFailure,
    },
}

impl RepeatError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The git sub-step behind this error, if it came from the version-control collaborator.
    pub fn git_step(&self) -> Option<GitStep> {
        match self {
            Self::Branch { failure, .. }
            | Self::Git { failure, .. }
            | Self::Push { failure, .. } => Some(failure.step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RepeatError>;
