//! Publish a CI branch that repeats one job N times.
//!
//! Given a local clone, the manifest is rewritten so the CI service runs a single
//! job in `N` parallel shards, then the change is committed on a fresh branch and
//! pushed. Validation, transform, save, branch, commit and push run strictly in
//! order and the first failure ends the run.

pub mod config;
pub mod error;
pub mod git;
pub mod job;
pub mod manifest;
pub mod pipeline;
pub mod working_copy;

use std::path::PathBuf;

pub use config::{Config, GitConfig, ProjectConfig};
pub use error::{GitFailure, GitStep, RepeatError, Result};
pub use git::{GitBackend, GitCli, GitWorkflow, WorkflowState};
pub use job::JobType;
pub use manifest::{CiManifest, ManifestStore};
pub use pipeline::{BranchPublishResult, PublishedBranch, Publisher, RepeatJobRequest};
pub use working_copy::{OriginStatus, WorkingCopy};

/// One-shot entry point: validate `root`, repeat `job` and push the branch to `remote`.
///
/// The job name is checked before anything on disk is read.
pub async fn publish_repeated_job(
    config: &Config,
    root: impl Into<PathBuf>,
    remote: &str,
    job: &str,
    globals: Vec<String>,
    repetitions: u32,
) -> BranchPublishResult {
    let request = RepeatJobRequest::new(job, repetitions)?.with_globals(globals);
    let working_copy = WorkingCopy::new(root, remote, config.project.clone());
    Publisher::from_config(config)
        .publish(&working_copy, &request)
        .await
}
