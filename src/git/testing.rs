use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use super::GitBackend;
use crate::error::{GitFailure, GitStep};

/// In-memory backend that records every call and can be told to fail one step.
#[derive(Default)]
pub(crate) struct RecordingGit {
    fail_at: Option<GitStep>,
    calls: Mutex<Vec<String>>,
    branches: Mutex<Vec<String>>,
}

impl RecordingGit {
    pub(crate) fn failing_at(step: GitStep) -> Self {
        Self {
            fail_at: Some(step),
            ..Self::default()
        }
    }

    pub(crate) fn with_branch(self, name: &str) -> Self {
        self.branches.lock().unwrap().push(name.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, step: GitStep, call: String) -> Result<(), GitFailure> {
        self.calls.lock().unwrap().push(call);
        if self.fail_at == Some(step) {
            Err(GitFailure::new(step, "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GitBackend for RecordingGit {
    async fn create_branch(&self, _root: &Path, name: &str) -> Result<(), GitFailure> {
        self.record(GitStep::CreateBranch, format!("branch {name}"))?;
        self.branches.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn checkout(&self, _root: &Path, name: &str) -> Result<(), GitFailure> {
        self.record(GitStep::Checkout, format!("checkout {name}"))
    }

    async fn stage(&self, _root: &Path, paths: &[PathBuf]) -> Result<(), GitFailure> {
        let paths: Vec<_> = paths.iter().map(|p| p.display().to_string()).collect();
        self.record(GitStep::Stage, format!("add {}", paths.join(" ")))
    }

    async fn commit(&self, _root: &Path, message: &str) -> Result<(), GitFailure> {
        self.record(GitStep::Commit, format!("commit {message}"))
    }

    async fn push(&self, _root: &Path, remote: &str, name: &str) -> Result<(), GitFailure> {
        self.record(GitStep::Push, format!("push {remote} {name}"))
    }

    async fn branch_exists(&self, _root: &Path, name: &str) -> Result<bool, GitFailure> {
        Ok(self.branches.lock().unwrap().iter().any(|b| b == name))
    }
}
