//! Version-control plumbing: the [`GitBackend`] seam, its subprocess implementation
//! and the branch/commit/push state machine built on top of it.

mod cli;
#[cfg(test)]
pub(crate) mod testing;
mod workflow;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::GitFailure;

pub use cli::GitCli;
pub use workflow::{GitWorkflow, WorkflowState};

/// Git operations the publish workflow needs against a working copy.
///
/// Every call is independently fallible and reports which step failed.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Creates `name` at the current `HEAD` without switching to it.
    async fn create_branch(&self, root: &Path, name: &str) -> Result<(), GitFailure>;

    async fn checkout(&self, root: &Path, name: &str) -> Result<(), GitFailure>;

    async fn stage(&self, root: &Path, paths: &[PathBuf]) -> Result<(), GitFailure>;

    async fn commit(&self, root: &Path, message: &str) -> Result<(), GitFailure>;

    async fn push(&self, root: &Path, remote: &str, name: &str) -> Result<(), GitFailure>;

    /// Whether a local branch called `name` exists.
    async fn branch_exists(&self, root: &Path, name: &str) -> Result<bool, GitFailure>;
}
