//! In-memory CI manifest plus the pure transform and the on-disk store.
//!
//! The manifest is kept as a raw YAML mapping rather than a typed struct so that
//! keys this tool does not know about survive a load/transform/save cycle.

mod store;
mod transform;

use serde_yaml::{Mapping, Value};

pub use store::ManifestStore;
pub use transform::{transform, DISPLAY_EXPORT};

pub(crate) const ENV: &str = "env";
pub(crate) const MATRIX: &str = "matrix";
pub(crate) const GLOBAL: &str = "global";
pub(crate) const BRANCHES: &str = "branches";
pub(crate) const ONLY: &str = "only";
pub(crate) const BEFORE_SCRIPT: &str = "before_script";
pub(crate) const NOTIFICATIONS: &str = "notifications";

/// Parsed `.travis.yml`.
#[derive(Debug, Clone, PartialEq)]
pub struct CiManifest {
    root: Mapping,
}

impl CiManifest {
    /// Parses manifest text. Fails with a human-readable reason when the text
    /// is not YAML or its top level is not a mapping.
    pub fn from_yaml_str(text: &str) -> Result<Self, String> {
        match serde_yaml::from_str::<Value>(text).map_err(|e| e.to_string())? {
            Value::Mapping(root) => Ok(Self { root }),
            Value::Null => Ok(Self {
                root: Mapping::new(),
            }),
            other => Err(format!(
                "top level must be a mapping, found {}",
                value_kind(&other)
            )),
        }
    }

    pub fn to_yaml_string(&self) -> Result<String, String> {
        serde_yaml::to_string(&self.root).map_err(|e| e.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    pub fn matrix(&self) -> Vec<String> {
        self.nested_strings(ENV, MATRIX)
    }

    pub fn global(&self) -> Vec<String> {
        self.nested_strings(ENV, GLOBAL)
    }

    pub fn branches_only(&self) -> Vec<String> {
        self.nested_strings(BRANCHES, ONLY)
    }

    pub fn before_script(&self) -> Vec<String> {
        strings(self.root.get(BEFORE_SCRIPT))
    }

    pub fn has_notifications(&self) -> bool {
        self.root.contains_key(NOTIFICATIONS)
    }

    pub(crate) fn root_mut(&mut self) -> &mut Mapping {
        &mut self.root
    }

    fn nested_strings(&self, outer: &str, inner: &str) -> Vec<String> {
        strings(self.root.get(outer).and_then(|v| v.get(inner)))
    }
}

fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
