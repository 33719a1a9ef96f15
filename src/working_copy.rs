use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::future::join;
use git2::{Config, ErrorCode};
use log::{debug, info, warn};

use crate::config::ProjectConfig;
use crate::error::{RepeatError, Result};

const ORIGIN: &str = "origin";

/// A local clone the pipeline operates on. Never mutated by the pipeline itself.
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    root: PathBuf,
    remote: String,
    project: ProjectConfig,
}

/// What validation learned about the `origin` remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginStatus {
    pub url: String,
    /// `origin` is exactly the canonical project URL rather than a fork.
    pub canonical: bool,
}

impl WorkingCopy {
    pub fn new(root: impl Into<PathBuf>, remote: impl Into<String>, project: ProjectConfig) -> Self {
        Self {
            root: root.into(),
            remote: remote.into(),
            project,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(&self.project.manifest_file)
    }

    pub fn git_config_path(&self) -> PathBuf {
        self.root.join(".git").join("config")
    }

    /// Checks that the manifest exists and that this is a clone of the expected project
    /// with the requested remote configured.
    ///
    /// Both checks run concurrently and both are awaited; when both fail the missing
    /// manifest is reported. A non-canonical `origin` is only logged and returned in
    /// [`OriginStatus`]: forks are allowed to proceed.
    pub async fn validate(&self) -> Result<OriginStatus> {
        info!("Validating working copy at {}", self.root.display());

        let (manifest, origin) = join(self.check_manifest(), self.check_git()).await;
        manifest?;
        let origin = origin?;

        if !origin.canonical {
            warn!(
                "origin remote {} is not {}, continuing anyway",
                origin.url, self.project.canonical_url
            );
        }

        Ok(origin)
    }

    async fn check_manifest(&self) -> Result<()> {
        let path = self.manifest_path();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                debug!("Found manifest at {}", path.display());
                Ok(())
            }
            Ok(_) => Err(RepeatError::ManifestNotFound(path)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(RepeatError::ManifestNotFound(path)),
            Err(e) => Err(RepeatError::io(path, e)),
        }
    }

    async fn check_git(&self) -> Result<OriginStatus> {
        let path = self.git_config_path();
        for (candidate, want_dir) in [(self.root.join(".git"), true), (path.clone(), false)] {
            match tokio::fs::metadata(&candidate).await {
                Ok(meta) if meta.is_dir() == want_dir => {}
                Ok(_) => {
                    return Err(self.not_a_clone(format!(
                        "{} is not a plain clone",
                        candidate.display()
                    )));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(self.not_a_clone(format!("no git config at {}", path.display())));
                }
                Err(e) => return Err(RepeatError::io(candidate, e)),
            }
        }

        let remote = self.remote.clone();
        let remotes = tokio::task::spawn_blocking(move || read_remotes(&path, &remote))
            .await
            .map_err(|e| RepeatError::io(self.git_config_path(), std::io::Error::other(e)))?
            .map_err(|e| self.not_a_clone(format!("unreadable git config: {}", e.message())))?;

        let url = remotes
            .origin_url
            .ok_or_else(|| self.not_a_clone("no origin remote URL".to_string()))?;

        if !url.ends_with(&self.project.expected_suffix) {
            return Err(self.not_a_clone(format!(
                "origin {url} does not end with {}",
                self.project.expected_suffix
            )));
        }

        if !remotes.has_remote {
            return Err(RepeatError::RemoteMissing(self.remote.clone()));
        }

        Ok(OriginStatus {
            canonical: url == self.project.canonical_url,
            url,
        })
    }

    fn not_a_clone(&self, reason: String) -> RepeatError {
        RepeatError::NotAClone {
            root: self.root.clone(),
            reason,
        }
    }
}

/// The remote facts `validate` needs from one `.git/config` file.
struct ConfiguredRemotes {
    origin_url: Option<String>,
    has_remote: bool,
}

/// Reads only the clone's own config file; system and global config are ignored.
fn read_remotes(path: &Path, remote: &str) -> std::result::Result<ConfiguredRemotes, git2::Error> {
    let config = Config::open(path)?;

    let origin_url = match config.get_string(&format!("remote.{ORIGIN}.url")) {
        Ok(url) => Some(url),
        Err(e) if e.code() == ErrorCode::NotFound => None,
        Err(e) => return Err(e),
    };

    // A remote exists as soon as any `remote.<name>.*` key is set.
    let prefix = format!("remote.{remote}.");
    let mut has_remote = false;
    let mut entries = config.entries(None)?;
    while let Some(entry) = entries.next() {
        if entry?.name().is_some_and(|name| name.starts_with(&prefix)) {
            has_remote = true;
            break;
        }
    }

    Ok(ConfiguredRemotes {
        origin_url,
        has_remote,
    })
}
