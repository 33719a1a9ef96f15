use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RepeatError;

/// CI jobs that can be repeated. Anything else is rejected before the working copy is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    Linters,
    UnitTestsInFirefox,
    #[serde(rename = "marionette_js")]
    MarionetteJs,
    #[serde(rename = "gaia_ui_tests")]
    GaiaUiTests,
    #[serde(rename = "build_tests")]
    BuildTests,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::Linters,
        JobType::UnitTestsInFirefox,
        JobType::MarionetteJs,
        JobType::GaiaUiTests,
        JobType::BuildTests,
    ];

    /// The `CI_ACTION` value the manifest's build script dispatches on.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linters => "linters",
            Self::UnitTestsInFirefox => "unit-tests-in-firefox",
            Self::MarionetteJs => "marionette_js",
            Self::GaiaUiTests => "gaia_ui_tests",
            Self::BuildTests => "build_tests",
        }
    }

    /// Single membership check for the closed job set.
    pub fn parse(name: &str) -> Result<Self, RepeatError> {
        Self::ALL
            .into_iter()
            .find(|job| job.as_str() == name)
            .ok_or_else(|| RepeatError::UnknownJobType(name.to_string()))
    }
}

impl FromStr for JobType {
    type Err = RepeatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
