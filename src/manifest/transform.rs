use serde_yaml::{Mapping, Value};

use super::{CiManifest, BEFORE_SCRIPT, BRANCHES, ENV, GLOBAL, MATRIX, NOTIFICATIONS, ONLY};
use crate::job::JobType;

/// Headless browser jobs need a virtual display; always the first `before_script` line.
pub const DISPLAY_EXPORT: &str = "export DISPLAY=:99.0";

/// Rewrites a manifest so the CI service runs `job` exactly `repetitions` times on `branch`.
///
/// `env.matrix`, `branches.only` and `before_script[0]` are overwritten, `globals` are
/// appended to `env.global` (never replacing what is there) and `notifications` is
/// dropped. Every other key passes through untouched. Missing containers are created,
/// so the transform cannot fail once the job type has been parsed.
pub fn transform(
    mut manifest: CiManifest,
    job: JobType,
    globals: &[String],
    repetitions: u32,
    branch: &str,
) -> CiManifest {
    let root = manifest.root_mut();

    let env = mapping_entry(root, ENV);
    let matrix = (0..repetitions)
        .map(|i| Value::String(format!("CI_ACTION={job} TRY={i}")))
        .collect();
    env.insert(Value::from(MATRIX), Value::Sequence(matrix));

    if !globals.is_empty() {
        sequence_entry(env, GLOBAL).extend(globals.iter().cloned().map(Value::String));
    }

    let branches = mapping_entry(root, BRANCHES);
    branches.insert(
        Value::from(ONLY),
        Value::Sequence(vec![Value::from(branch)]),
    );

    let before_script = sequence_entry(root, BEFORE_SCRIPT);
    match before_script.first_mut() {
        Some(first) => *first = Value::from(DISPLAY_EXPORT),
        None => before_script.push(Value::from(DISPLAY_EXPORT)),
    }

    root.shift_remove(NOTIFICATIONS);

    manifest
}

/// Returns the mapping under `key`, replacing a missing or non-mapping value with an empty one.
fn mapping_entry<'a>(map: &'a mut Mapping, key: &str) -> &'a mut Mapping {
    let slot = map
        .entry(Value::from(key))
        .or_insert(Value::Mapping(Mapping::new()));
    if !slot.is_mapping() {
        *slot = Value::Mapping(Mapping::new());
    }
    match slot {
        Value::Mapping(mapping) => mapping,
        _ => unreachable!("slot holds a mapping"),
    }
}

/// Returns the sequence under `key`. A lone scalar becomes a one-element sequence, null an empty one.
fn sequence_entry<'a>(map: &'a mut Mapping, key: &str) -> &'a mut Vec<Value> {
    let slot = map.entry(Value::from(key)).or_insert(Value::Null);
    let items = match std::mem::replace(slot, Value::Null) {
        Value::Sequence(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    *slot = Value::Sequence(items);
    match slot {
        Value::Sequence(items) => items,
        _ => unreachable!("slot holds a sequence"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAVIS: &str = r#"
language: node_js
node_js:
  - "0.10"
env:
  global:
    - X=1
  matrix:
    - CI_ACTION=linters
    - CI_ACTION=build_tests
branches:
  only:
    - master
    - v2.0
before_script:
  - sh -e /etc/init.d/xvfb start
  - npm install
script:
  - bash tests/travis_ci/$CI_ACTION/script
notifications:
  irc:
    channels:
      - irc.mozilla.org#gaia
"#;

    fn manifest() -> CiManifest {
        CiManifest::from_yaml_str(TRAVIS).unwrap()
    }

    fn globals(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matrix_has_one_entry_per_repetition() {
        let out = transform(manifest(), JobType::MarionetteJs, &[], 4, "b");

        assert_eq!(
            out.matrix(),
            vec![
                "CI_ACTION=marionette_js TRY=0",
                "CI_ACTION=marionette_js TRY=1",
                "CI_ACTION=marionette_js TRY=2",
                "CI_ACTION=marionette_js TRY=3",
            ]
        );
    }

    #[test]
    fn test_branches_only_is_replaced_with_target_branch() {
        let out = transform(manifest(), JobType::Linters, &[], 1, "linters_42");
        assert_eq!(out.branches_only(), vec!["linters_42"]);
    }

    #[test]
    fn test_before_script_first_line_exports_display() {
        let out = transform(manifest(), JobType::Linters, &[], 1, "b");
        assert_eq!(out.before_script(), vec![DISPLAY_EXPORT, "npm install"]);
    }

    #[test]
    fn test_globals_are_appended_in_order() {
        let out = transform(
            manifest(),
            JobType::UnitTestsInFirefox,
            &globals(&["APP=communications/contacts", "Y=2"]),
            1,
            "b",
        );
        assert_eq!(out.global(), vec!["X=1", "APP=communications/contacts", "Y=2"]);
    }

    #[test]
    fn test_notifications_are_removed() {
        let out = transform(manifest(), JobType::Linters, &[], 1, "b");
        assert!(!out.has_notifications());

        let without = CiManifest::from_yaml_str("language: node_js\n").unwrap();
        let out = transform(without, JobType::Linters, &[], 1, "b");
        assert!(!out.has_notifications());
    }

    #[test]
    fn test_unrelated_keys_pass_through() {
        let input = manifest();
        let out = transform(input.clone(), JobType::GaiaUiTests, &[], 2, "b");

        for key in ["language", "node_js", "script"] {
            assert_eq!(out.get(key), input.get(key), "key {key} changed");
        }
    }

    #[test]
    fn test_repeat_transform_is_stable_except_globals() {
        let extra = globals(&["Y=2"]);
        let once = transform(manifest(), JobType::BuildTests, &extra, 3, "b");
        let twice = transform(once.clone(), JobType::BuildTests, &extra, 3, "b");

        assert_eq!(twice.matrix(), once.matrix());
        assert_eq!(twice.branches_only(), once.branches_only());
        assert_eq!(twice.before_script(), once.before_script());
        // env.global only ever grows
        assert_eq!(once.global(), vec!["X=1", "Y=2"]);
        assert_eq!(twice.global(), vec!["X=1", "Y=2", "Y=2"]);
    }

    #[test]
    fn test_missing_sections_are_created() {
        let bare = CiManifest::from_yaml_str("language: node_js\n").unwrap();
        let out = transform(bare, JobType::Linters, &globals(&["Y=2"]), 2, "b");

        assert_eq!(out.matrix().len(), 2);
        assert_eq!(out.global(), vec!["Y=2"]);
        assert_eq!(out.branches_only(), vec!["b"]);
        assert_eq!(out.before_script(), vec![DISPLAY_EXPORT]);
    }

    #[test]
    fn test_scalar_sections_are_treated_as_single_entries() {
        let scalar = CiManifest::from_yaml_str(
            "env:\n  global: X=1\nbefore_script: echo hi\n",
        )
        .unwrap();
        let out = transform(scalar, JobType::Linters, &globals(&["Y=2"]), 1, "b");

        assert_eq!(out.global(), vec!["X=1", "Y=2"]);
        assert_eq!(out.before_script(), vec![DISPLAY_EXPORT]);
    }

    #[test]
    fn test_empty_globals_leave_env_global_alone() {
        let out = transform(manifest(), JobType::Linters, &[], 1, "b");
        assert_eq!(out.global(), vec!["X=1"]);
    }

    #[test]
    fn test_output_round_trips_through_yaml() {
        let out = transform(manifest(), JobType::Linters, &globals(&["Y=2"]), 3, "b");
        let text = out.to_yaml_string().unwrap();
        let reparsed = CiManifest::from_yaml_str(&text).unwrap();
        assert_eq!(reparsed, out);
    }
}
