use std::fmt;
use std::path::{Path, PathBuf};

use log::info;

use super::GitBackend;
use crate::error::{GitFailure, GitStep, RepeatError, Result};

/// Progress of publishing one branch.
///
/// ```text
/// Pending → Created → CheckedOut → Staged → Committed → Pushed
///    ↓         ↓           ↓          ↓          ↓
///  Failed    Failed      Failed     Failed     Failed
/// ```
///
/// `Failed` is terminal. Nothing is rolled back: a branch that was created and
/// committed stays that way when the push fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Pending,
    Created,
    CheckedOut,
    Staged,
    Committed,
    Pushed,
    Failed(GitFailure),
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Created => f.write_str("created"),
            Self::CheckedOut => f.write_str("checked out"),
            Self::Staged => f.write_str("staged"),
            Self::Committed => f.write_str("committed"),
            Self::Pushed => f.write_str("pushed"),
            Self::Failed(failure) => write!(f, "failed ({failure})"),
        }
    }
}

/// Drives branch creation, commit and push for one branch of one working copy.
pub struct GitWorkflow<'a, G: GitBackend + ?Sized> {
    git: &'a G,
    root: &'a Path,
    branch: &'a str,
    state: WorkflowState,
}

impl<'a, G: GitBackend + ?Sized> GitWorkflow<'a, G> {
    pub fn new(git: &'a G, root: &'a Path, branch: &'a str) -> Self {
        Self {
            git,
            root,
            branch,
            state: WorkflowState::Pending,
        }
    }

    /// Picks up a branch that an earlier run already created and committed,
    /// so only the push remains.
    pub fn resume_committed(git: &'a G, root: &'a Path, branch: &'a str) -> Self {
        Self {
            state: WorkflowState::Committed,
            ..Self::new(git, root, branch)
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub async fn create_branch(&mut self) -> Result<()> {
        self.require(WorkflowState::Pending, GitStep::CreateBranch)
            .map_err(|failure| self.branch_error(failure))?;

        info!("Creating branch {}", self.branch);
        let outcome = self.git.create_branch(self.root, self.branch).await;
        self.advance(outcome, WorkflowState::Created)
            .map_err(|failure| self.branch_error(failure))
    }

    /// Switches onto the branch, stages exactly `paths` and commits them.
    pub async fn checkout_and_commit(&mut self, paths: &[PathBuf], message: &str) -> Result<()> {
        self.checkout_stage_commit(paths, message)
            .await
            .map_err(|failure| RepeatError::Git {
                branch: self.branch.to_string(),
                failure,
            })
    }

    async fn checkout_stage_commit(
        &mut self,
        paths: &[PathBuf],
        message: &str,
    ) -> std::result::Result<(), GitFailure> {
        self.require(WorkflowState::Created, GitStep::Checkout)?;

        info!("Committing {} file(s) on {}", paths.len(), self.branch);
        let outcome = self.git.checkout(self.root, self.branch).await;
        self.advance(outcome, WorkflowState::CheckedOut)?;

        let outcome = self.git.stage(self.root, paths).await;
        self.advance(outcome, WorkflowState::Staged)?;

        let outcome = self.git.commit(self.root, message).await;
        self.advance(outcome, WorkflowState::Committed)
    }

    pub async fn push(&mut self, remote: &str) -> Result<()> {
        let branch = self.branch;
        let push_error = |failure: GitFailure| RepeatError::Push {
            branch: branch.to_string(),
            remote: remote.to_string(),
            failure,
        };

        self.require(WorkflowState::Committed, GitStep::Push)
            .map_err(push_error)?;

        info!("Pushing {} to {remote}", self.branch);
        let outcome = self.git.push(self.root, remote, self.branch).await;
        self.advance(outcome, WorkflowState::Pushed)
            .map_err(push_error)
    }

    fn require(
        &self,
        expected: WorkflowState,
        step: GitStep,
    ) -> std::result::Result<(), GitFailure> {
        match &self.state {
            WorkflowState::Failed(failure) => Err(failure.clone()),
            state if *state == expected => Ok(()),
            state => Err(GitFailure::new(
                step,
                format!("branch {} is {state}, expected {expected}", self.branch),
            )),
        }
    }

    fn advance(
        &mut self,
        outcome: std::result::Result<(), GitFailure>,
        next: WorkflowState,
    ) -> std::result::Result<(), GitFailure> {
        match outcome {
            Ok(()) => {
                self.state = next;
                Ok(())
            }
            Err(failure) => {
                self.state = WorkflowState::Failed(failure.clone());
                Err(failure)
            }
        }
    }

    fn branch_error(&self, failure: GitFailure) -> RepeatError {
        RepeatError::Branch {
            branch: self.branch.to_string(),
            failure,
        }
    }
}
