use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_CANDIDATES: [&str; 4] = [
    "ci-repeat.toml",
    "ci-repeat.json",
    "ci-repeat.yaml",
    "ci-repeat.yml",
];

/// Configuration file structure for ci-repeat.
///
/// Every value has a default, so running without a configuration file targets
/// the Gaia project on GitHub with a two minute deadline per git call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Project the working copy must be a clone of
    #[serde(default)]
    pub project: ProjectConfig,

    /// Git invocation settings
    #[serde(default)]
    pub git: GitConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    /// URL an untouched clone has as its `origin` remote
    #[serde(default = "default_canonical_url")]
    pub canonical_url: String,

    /// Suffix any fork's `origin` URL must end with
    #[serde(default = "default_expected_suffix")]
    pub expected_suffix: String,

    /// CI manifest file name, relative to the working-copy root
    #[serde(default = "default_manifest_file")]
    pub manifest_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitConfig {
    /// Git executable to run
    #[serde(default = "default_git_binary")]
    pub binary: PathBuf,

    /// Deadline for each git invocation, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Remote to push to when none is given on the command line
    #[serde(default = "default_remote")]
    pub default_remote: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            canonical_url: default_canonical_url(),
            expected_suffix: default_expected_suffix(),
            manifest_file: default_manifest_file(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_git_binary(),
            timeout_secs: default_timeout_secs(),
            default_remote: default_remote(),
        }
    }
}

impl GitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_canonical_url() -> String {
    "https://github.com/mozilla-b2g/gaia.git".to_string()
}

fn default_expected_suffix() -> String {
    "gaia.git".to_string()
}

fn default_manifest_file() -> PathBuf {
    PathBuf::from(".travis.yml")
}

fn default_git_binary() -> PathBuf {
    PathBuf::from("git")
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_remote() -> String {
    "origin".to_string()
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./ci-repeat.toml
    /// 3. ./ci-repeat.json
    /// 4. ./ci-repeat.yaml
    /// 5. ./ci-repeat.yml
    /// 6. `<user config dir>/ci-repeat/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let user_config = dirs::config_dir().map(|dir| dir.join("ci-repeat").join("config.toml"));

        let found = CONFIG_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .chain(user_config)
            .find(|candidate| candidate.exists());

        match found {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}
