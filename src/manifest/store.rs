use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::debug;

use super::CiManifest;
use crate::error::{RepeatError, Result};
use crate::working_copy::WorkingCopy;

/// Reads and writes the manifest file of one working copy.
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(working_copy: &WorkingCopy) -> Self {
        Self {
            path: working_copy.manifest_path(),
        }
    }

    pub async fn load(&self) -> Result<CiManifest> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| RepeatError::io(&self.path, e))?;

        let manifest = CiManifest::from_yaml_str(&text).map_err(|reason| RepeatError::Parse {
            path: self.path.clone(),
            reason,
        })?;

        debug!("Loaded manifest from {}", self.path.display());
        Ok(manifest)
    }

    /// Replaces the manifest on disk.
    ///
    /// The new content goes to a temporary file next to the manifest which is then
    /// renamed over it, so a crash mid-write never leaves a truncated manifest.
    pub async fn save(&self, manifest: &CiManifest) -> Result<()> {
        let text = manifest
            .to_yaml_string()
            .map_err(|reason| unserializable(&self.path, reason))?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, text.as_bytes()))
            .await
            .map_err(|e| RepeatError::io(&self.path, io::Error::other(e)))?
            .map_err(|e| RepeatError::io(&self.path, e))?;

        debug!("Saved manifest to {}", self.path.display());
        Ok(())
    }
}

/// A manifest that cannot be rendered back to YAML is reported as invalid data,
/// keeping `save` to IO failures only.
fn unserializable(path: &Path, reason: String) -> RepeatError {
    RepeatError::io(path, io::Error::new(ErrorKind::InvalidData, reason))
}

fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    if let Ok(meta) = std::fs::metadata(path) {
        temp.as_file().set_permissions(meta.permissions())?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
