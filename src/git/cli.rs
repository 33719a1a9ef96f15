use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;
use tokio::time::timeout;

use super::GitBackend;
use crate::config::GitConfig;
use crate::error::{GitFailure, GitStep};

/// [`GitBackend`] that shells out to the `git` executable.
///
/// Each invocation runs under a deadline and with terminal prompts disabled, so an
/// unreachable remote or a credential prompt fails the step instead of hanging.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &GitConfig) -> Self {
        Self::new(&config.binary, config.timeout())
    }

    async fn output<I, S>(&self, root: &Path, step: GitStep, args: I) -> Result<Output, GitFailure>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .current_dir(root)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true);

        debug!("Running {:?} in {}", command.as_std(), root.display());

        match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(GitFailure::new(
                step,
                format!("could not run {}: {e}", self.binary.display()),
            )),
            Err(_) => Err(GitFailure::new(
                step,
                format!("timed out after {}s", self.timeout.as_secs()),
            )),
        }
    }

    async fn run<I, S>(&self, root: &Path, step: GitStep, args: I) -> Result<(), GitFailure>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.output(root, step, args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(GitFailure::new(step, describe_failure(&output)))
        }
    }
}

fn describe_failure(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let message = if stderr.trim().is_empty() {
        stdout.trim()
    } else {
        stderr.trim()
    };

    if message.is_empty() {
        format!("exited with {}", output.status)
    } else {
        message.to_string()
    }
}

#[async_trait]
impl GitBackend for GitCli {
    async fn create_branch(&self, root: &Path, name: &str) -> Result<(), GitFailure> {
        self.run(root, GitStep::CreateBranch, ["branch", name]).await
    }

    async fn checkout(&self, root: &Path, name: &str) -> Result<(), GitFailure> {
        self.run(root, GitStep::Checkout, ["checkout", name]).await
    }

    async fn stage(&self, root: &Path, paths: &[PathBuf]) -> Result<(), GitFailure> {
        let args = [OsStr::new("add"), OsStr::new("--")]
            .into_iter()
            .chain(paths.iter().map(|p| p.as_os_str()));
        self.run(root, GitStep::Stage, args).await
    }

    async fn commit(&self, root: &Path, message: &str) -> Result<(), GitFailure> {
        self.run(root, GitStep::Commit, ["commit", "-m", message]).await
    }

    async fn push(&self, root: &Path, remote: &str, name: &str) -> Result<(), GitFailure> {
        self.run(root, GitStep::Push, ["push", remote, name]).await
    }

    async fn branch_exists(&self, root: &Path, name: &str) -> Result<bool, GitFailure> {
        let reference = format!("refs/heads/{name}");
        let output = self
            .output(
                root,
                GitStep::Push,
                ["rev-parse", "--verify", "--quiet", reference.as_str()],
            )
            .await?;

        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitFailure::new(GitStep::Push, describe_failure(&output))),
        }
    }
}
