use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use log::info;
use tokio::sync::OwnedMutexGuard;

use crate::config::Config;
use crate::error::{GitFailure, GitStep, RepeatError, Result};
use crate::git::{GitBackend, GitCli, GitWorkflow};
use crate::job::JobType;
use crate::manifest::{transform, CiManifest, ManifestStore};
use crate::working_copy::{OriginStatus, WorkingCopy};

/// One "run this job N times" unit of work.
///
/// Construction is the fast-fail guard: an unknown job or zero repetitions is
/// rejected here, before any working copy is looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatJobRequest {
    job: JobType,
    globals: Vec<String>,
    repetitions: u32,
    branch: Option<String>,
}

impl RepeatJobRequest {
    pub fn new(job: &str, repetitions: u32) -> Result<Self> {
        let job = JobType::parse(job)?;
        if repetitions == 0 {
            return Err(RepeatError::InvalidRepetitions(repetitions));
        }

        Ok(Self {
            job,
            globals: Vec::new(),
            repetitions,
            branch: None,
        })
    }

    /// Extra `KEY=VALUE` directives appended to `env.global`.
    pub fn with_globals(mut self, globals: Vec<String>) -> Self {
        self.globals = globals;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn job(&self) -> JobType {
        self.job
    }

    pub fn globals(&self) -> &[String] {
        &self.globals
    }

    pub fn repetitions(&self) -> u32 {
        self.repetitions
    }

    /// The requested branch, or `<job>_<epoch millis>` when none was given.
    pub fn branch_name(&self) -> String {
        self.branch
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.job, Utc::now().timestamp_millis()))
    }

    pub fn commit_message(&self) -> String {
        let extras = if self.globals.is_empty() {
            "none".to_string()
        } else {
            self.globals.join(", ")
        };

        format!(
            "Repeat CI job {}\n\nRepetitions: {}\nWith extras: {extras}",
            self.job, self.repetitions
        )
    }
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedBranch {
    pub branch: String,
    pub remote: String,
    pub origin: OriginStatus,
}

pub type BranchPublishResult = Result<PublishedBranch>;

/// Runs validate, transform, save, branch, commit and push against working copies.
///
/// Stages run strictly in order and the first failure is returned unchanged; side
/// effects of the stages that already ran are kept. Publishes against the same
/// root are serialized.
pub struct Publisher<G: GitBackend> {
    git: G,
    locks: LockTable,
}

type LockTable = Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>;

/// Holds one root's lock. On drop the lock is released and the root's table entry
/// is removed when no other run is holding or waiting on it.
struct RootGuard<'a> {
    table: &'a LockTable,
    key: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RootGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if table
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.key);
        }
    }
}

impl Publisher<GitCli> {
    pub fn from_config(config: &Config) -> Self {
        Self::new(GitCli::from_config(&config.git))
    }
}

impl<G: GitBackend> Publisher<G> {
    pub fn new(git: G) -> Self {
        Self {
            git,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn publish(
        &self,
        working_copy: &WorkingCopy,
        request: &RepeatJobRequest,
    ) -> BranchPublishResult {
        let branch = request.branch_name();
        let _guard = self.lock_root(working_copy.root()).await;

        info!(
            "Publishing {} x{} as {branch}",
            request.job(),
            request.repetitions()
        );

        let origin = working_copy.validate().await?;

        let store = ManifestStore::new(working_copy);
        let manifest = store.load().await?;
        let manifest = transform(
            manifest,
            request.job(),
            request.globals(),
            request.repetitions(),
            &branch,
        );
        store.save(&manifest).await?;

        let root = working_copy.root();
        let staged = [working_copy.project().manifest_file.clone()];
        let mut workflow = GitWorkflow::new(&self.git, root, &branch);
        workflow.create_branch().await?;
        workflow
            .checkout_and_commit(&staged, &request.commit_message())
            .await?;
        workflow.push(working_copy.remote()).await?;

        info!("Published {branch} to {}", working_copy.remote());
        Ok(PublishedBranch {
            branch,
            remote: working_copy.remote().to_string(),
            origin,
        })
    }

    /// Dry run: the manifest `publish` would commit, without writing it or touching git.
    pub async fn render(
        &self,
        working_copy: &WorkingCopy,
        request: &RepeatJobRequest,
    ) -> Result<(String, CiManifest)> {
        let branch = request.branch_name();
        let manifest = ManifestStore::new(working_copy).load().await?;
        let manifest = transform(
            manifest,
            request.job(),
            request.globals(),
            request.repetitions(),
            &branch,
        );
        Ok((branch, manifest))
    }

    /// Pushes a branch that an earlier `publish` created and committed but failed to push.
    pub async fn resume_push(&self, working_copy: &WorkingCopy, branch: &str) -> Result<()> {
        let _guard = self.lock_root(working_copy.root()).await;

        working_copy.validate().await?;

        let root = working_copy.root();
        let remote = working_copy.remote();
        let exists = self
            .git
            .branch_exists(root, branch)
            .await
            .map_err(|failure| push_error(branch, remote, failure))?;
        if !exists {
            return Err(push_error(
                branch,
                remote,
                GitFailure::new(GitStep::Push, "branch does not exist locally"),
            ));
        }

        GitWorkflow::resume_committed(&self.git, root, branch)
            .push(remote)
            .await?;

        info!("Published {branch} to {remote}");
        Ok(())
    }

    async fn lock_root(&self, root: &Path) -> RootGuard<'_> {
        let key = tokio::fs::canonicalize(root)
            .await
            .unwrap_or_else(|_| root.to_path_buf());

        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();

        RootGuard {
            table: &self.locks,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }
}

fn push_error(branch: &str, remote: &str, failure: GitFailure) -> RepeatError {
    RepeatError::Push {
        branch: branch.to_string(),
        remote: remote.to_string(),
        failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::git::testing::RecordingGit;
    use crate::manifest::DISPLAY_EXPORT;
    use crate::working_copy::tests::{git_config_with, MANIFEST};
    use std::fs;
    use std::process::Command;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fake_clone() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".travis.yml"), MANIFEST).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(
            dir.path().join(".git").join("config"),
            git_config_with(&[("origin", "https://github.com/mozilla-b2g/gaia.git")]),
        )
        .unwrap();
        dir
    }

    fn working_copy(root: &Path, remote: &str) -> WorkingCopy {
        WorkingCopy::new(root, remote, ProjectConfig::default())
    }

    fn read_manifest(root: &Path) -> CiManifest {
        CiManifest::from_yaml_str(&fs::read_to_string(root.join(".travis.yml")).unwrap()).unwrap()
    }

    fn linters_request() -> RepeatJobRequest {
        RepeatJobRequest::new("linters", 3)
            .unwrap()
            .with_globals(vec!["Y=2".to_string()])
    }

    #[test]
    fn test_unknown_job_is_rejected_up_front() {
        let err = RepeatJobRequest::new("unit-tests-in-chrome", 3).unwrap_err();
        assert!(matches!(err, RepeatError::UnknownJobType(_)));
    }

    #[test]
    fn test_zero_repetitions_is_rejected() {
        let err = RepeatJobRequest::new("linters", 0).unwrap_err();
        assert!(matches!(err, RepeatError::InvalidRepetitions(0)));
    }

    #[test]
    fn test_generated_branch_name() {
        let name = RepeatJobRequest::new("gaia_ui_tests", 1).unwrap().branch_name();
        let millis = name.strip_prefix("gaia_ui_tests_").unwrap();
        assert!(millis.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn test_commit_message_summarizes_request() {
        let message = linters_request().commit_message();
        assert!(message.starts_with("Repeat CI job linters"));
        assert!(message.contains("Repetitions: 3"));
        assert!(message.contains("With extras: Y=2"));

        let plain = RepeatJobRequest::new("build_tests", 1).unwrap().commit_message();
        assert!(plain.contains("With extras: none"));
    }

    #[tokio::test]
    async fn test_publish_transforms_and_runs_git_in_order() {
        let dir = fake_clone();
        let publisher = Publisher::new(RecordingGit::default());

        let published = publisher
            .publish(&working_copy(dir.path(), "origin"), &linters_request())
            .await
            .unwrap();

        assert!(published.branch.starts_with("linters_"));
        assert!(published.origin.canonical);

        let manifest = read_manifest(dir.path());
        assert_eq!(
            manifest.matrix(),
            vec![
                "CI_ACTION=linters TRY=0",
                "CI_ACTION=linters TRY=1",
                "CI_ACTION=linters TRY=2",
            ]
        );
        assert_eq!(manifest.global(), vec!["X=1", "Y=2"]);
        assert_eq!(manifest.branches_only(), vec![published.branch.clone()]);
        assert_eq!(manifest.before_script(), vec![DISPLAY_EXPORT]);

        let calls = publisher.git.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[0], format!("branch {}", published.branch));
        assert_eq!(calls[1], format!("checkout {}", published.branch));
        assert_eq!(calls[2], "add .travis.yml");
        assert!(calls[3].starts_with("commit Repeat CI job linters"));
        assert_eq!(calls[4], format!("push origin {}", published.branch));
    }

    #[tokio::test]
    async fn test_validation_failure_stops_before_mutation() {
        let dir = fake_clone();
        let publisher = Publisher::new(RecordingGit::default());

        let err = publisher
            .publish(&working_copy(dir.path(), "upstream"), &linters_request())
            .await
            .unwrap_err();

        assert!(matches!(err, RepeatError::RemoteMissing(_)));
        assert_eq!(fs::read_to_string(dir.path().join(".travis.yml")).unwrap(), MANIFEST);
        assert!(publisher.git.calls().is_empty());
    }

    #[tokio::test]
    async fn test_parse_failure_stops_before_git() {
        let dir = fake_clone();
        fs::write(dir.path().join(".travis.yml"), "- just\n- a list\n").unwrap();
        let publisher = Publisher::new(RecordingGit::default());

        let err = publisher
            .publish(&working_copy(dir.path(), "origin"), &linters_request())
            .await
            .unwrap_err();

        assert!(matches!(err, RepeatError::Parse { .. }));
        assert!(publisher.git.calls().is_empty());
    }

    #[tokio::test]
    async fn test_commit_failure_skips_push() {
        let dir = fake_clone();
        let publisher = Publisher::new(RecordingGit::failing_at(GitStep::Commit));

        let err = publisher
            .publish(&working_copy(dir.path(), "origin"), &linters_request())
            .await
            .unwrap_err();

        assert_eq!(err.git_step(), Some(GitStep::Commit));
        assert!(!publisher.git.calls().iter().any(|c| c.starts_with("push")));
        // The manifest write is not rolled back
        assert_eq!(read_manifest(dir.path()).matrix().len(), 3);
    }

    #[tokio::test]
    async fn test_render_does_not_write() {
        let dir = fake_clone();
        let publisher = Publisher::new(RecordingGit::default());
        let request = linters_request().with_branch("try-linters");

        let (branch, manifest) = publisher
            .render(&working_copy(dir.path(), "origin"), &request)
            .await
            .unwrap();

        assert_eq!(branch, "try-linters");
        assert_eq!(manifest.branches_only(), vec!["try-linters"]);
        assert_eq!(fs::read_to_string(dir.path().join(".travis.yml")).unwrap(), MANIFEST);
        assert!(publisher.git.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resume_push_requires_existing_branch() {
        let dir = fake_clone();
        let publisher = Publisher::new(RecordingGit::default());

        let err = publisher
            .resume_push(&working_copy(dir.path(), "origin"), "linters_1")
            .await
            .unwrap_err();

        assert!(matches!(err, RepeatError::Push { .. }));
        assert!(err.to_string().contains("does not exist locally"));
        assert!(publisher.git.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resume_push_only_pushes() {
        let dir = fake_clone();
        let publisher = Publisher::new(RecordingGit::default().with_branch("linters_1"));

        publisher
            .resume_push(&working_copy(dir.path(), "origin"), "linters_1")
            .await
            .unwrap();

        assert_eq!(publisher.git.calls(), vec!["push origin linters_1"]);
    }

    #[tokio::test]
    async fn test_publishes_on_one_root_are_serialized() {
        let dir = fake_clone();
        let publisher = Publisher::new(RecordingGit::default());
        let working_copy = working_copy(dir.path(), "origin");
        let first = linters_request().with_branch("first");
        let second = linters_request().with_branch("second");

        let (a, b) = tokio::join!(
            publisher.publish(&working_copy, &first),
            publisher.publish(&working_copy, &second)
        );
        a.unwrap();
        b.unwrap();

        assert!(publisher.locks.lock().unwrap().is_empty());

        let calls = publisher.git.calls();
        assert_eq!(calls.len(), 10);
        for run in calls.chunks(5) {
            let branch = run[0].strip_prefix("branch ").unwrap();
            assert_eq!(run[1], format!("checkout {branch}"));
            assert_eq!(run[4], format!("push origin {branch}"));
        }
    }

    #[tokio::test]
    async fn test_lock_entry_dropped_after_failed_run() {
        let dir = fake_clone();
        let publisher = Publisher::new(RecordingGit::failing_at(GitStep::Push));
        let working_copy = working_copy(dir.path(), "origin");

        publisher
            .publish(&working_copy, &linters_request())
            .await
            .unwrap_err();
        assert!(publisher.locks.lock().unwrap().is_empty());

        {
            let _held = publisher.lock_root(dir.path()).await;
            assert_eq!(publisher.locks.lock().unwrap().len(), 1);
        }
        assert!(publisher.locks.lock().unwrap().is_empty());
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// A real clone whose `origin` is a local bare repository ending in `gaia.git`,
    /// plus a `broken` remote pointing nowhere.
    fn real_clone() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let bare = dir.path().join("remote").join("gaia.git");
        let work = dir.path().join("work");
        fs::create_dir_all(&bare).unwrap();
        fs::create_dir_all(&work).unwrap();

        git(&bare, &["init", "--bare", "--quiet"]);
        git(&work, &["init", "--quiet"]);
        git(&work, &["config", "user.name", "Repeat Tester"]);
        git(&work, &["config", "user.email", "tester@example.com"]);
        git(&work, &["config", "commit.gpgsign", "false"]);
        git(&work, &["remote", "add", "origin", bare.to_str().unwrap()]);
        let missing = dir.path().join("missing").join("gaia.git");
        git(&work, &["remote", "add", "broken", missing.to_str().unwrap()]);

        fs::write(work.join(".travis.yml"), MANIFEST).unwrap();
        git(&work, &["add", ".travis.yml"]);
        git(&work, &["commit", "--quiet", "-m", "initial"]);

        (dir, work, bare)
    }

    fn real_publisher() -> Publisher<GitCli> {
        Publisher::new(GitCli::new("git", Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_publish_against_real_git() {
        let (_dir, work, bare) = real_clone();
        let publisher = real_publisher();

        let published = publisher
            .publish(&working_copy(&work, "origin"), &linters_request())
            .await
            .unwrap();

        assert!(!published.origin.canonical);
        assert_eq!(git(&work, &["rev-parse", "--abbrev-ref", "HEAD"]), published.branch);
        assert!(git(&work, &["log", "-1", "--format=%s"]).starts_with("Repeat CI job linters"));
        assert_eq!(git(&work, &["status", "--porcelain"]), "");

        let pushed = format!("refs/heads/{}", published.branch);
        assert_eq!(
            git(&bare, &["rev-parse", &pushed]),
            git(&work, &["rev-parse", "HEAD"])
        );
    }

    #[tokio::test]
    async fn test_push_failure_leaves_local_commit_and_resume_recovers() {
        let (_dir, work, bare) = real_clone();
        let publisher = real_publisher();
        let request = linters_request().with_branch("linters_retry");

        let err = publisher
            .publish(&working_copy(&work, "broken"), &request)
            .await
            .unwrap_err();

        assert!(matches!(err, RepeatError::Push { ref remote, .. } if remote == "broken"));
        assert_eq!(
            git(&work, &["log", "-1", "--format=%s", "linters_retry"]),
            "Repeat CI job linters"
        );

        publisher
            .resume_push(&working_copy(&work, "origin"), "linters_retry")
            .await
            .unwrap();
        assert_eq!(
            git(&bare, &["rev-parse", "refs/heads/linters_retry"]),
            git(&work, &["rev-parse", "linters_retry"])
        );
    }

    #[tokio::test]
    async fn test_existing_branch_fails_at_branch_step() {
        let (_dir, work, _bare) = real_clone();
        git(&work, &["branch", "taken"]);
        let publisher = real_publisher();

        let err = publisher
            .publish(
                &working_copy(&work, "origin"),
                &linters_request().with_branch("taken"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RepeatError::Branch { .. }));
        assert_ne!(git(&work, &["rev-parse", "--abbrev-ref", "HEAD"]), "taken");
    }
}
