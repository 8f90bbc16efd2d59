//! Verification state embedded in a `Project`, and the individual checks a
//! verification run produces.

use serde::{Deserialize, Serialize};

use super::priority::Priority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum VerificationStatus {
    #[default]
    NotStarted,
    InProgress,
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Build,
    Test,
    Lint,
    Doc,
}

impl std::fmt::Display for CheckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Build => "build",
            Self::Test => "test",
            Self::Lint => "lint",
            Self::Doc => "doc",
        };
        write!(f, "{s}")
    }
}

/// Success criterion evaluated against a check's combined stdout+stderr.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SuccessCriterion {
    ExitCode0,
    Contains(String),
    NotContains(String),
}

impl SuccessCriterion {
    pub fn parse(spec: &str) -> Self {
        if let Some(needle) = spec.strip_prefix("not_contains:") {
            Self::NotContains(needle.to_string())
        } else if let Some(needle) = spec.strip_prefix("contains:") {
            Self::Contains(needle.to_string())
        } else {
            Self::ExitCode0
        }
    }

    pub fn evaluate(&self, exit_code: i32, combined_output: &str) -> bool {
        match self {
            Self::ExitCode0 => exit_code == 0,
            Self::Contains(needle) => combined_output.contains(needle.as_str()),
            Self::NotContains(needle) => !combined_output.contains(needle.as_str()),
        }
    }
}

/// A single verification step, as declared by Wyrm or auto-detected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationStep {
    pub check_type: CheckType,
    pub command: String,
    pub priority: Priority,
    #[serde(default = "default_criterion")]
    pub success_criterion: String,
}

fn default_criterion() -> String {
    "exit_code_0".to_string()
}

/// The executed result of one [`VerificationStep`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub check_type: CheckType,
    pub command: String,
    pub priority: Priority,
    pub exit_code: Option<i32>,
    pub output: String,
    pub duration_seconds: f64,
    pub executed_at: i64,
    pub passed: bool,
    /// Set when the step was killed for exceeding its timeout.
    #[serde(default)]
    pub timed_out: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VerificationState {
    pub status: VerificationStatus,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub report: Option<String>,
    pub checks: Vec<VerificationCheck>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criterion_parsing() {
        assert!(matches!(SuccessCriterion::parse("exit_code_0"), SuccessCriterion::ExitCode0));
        assert!(matches!(SuccessCriterion::parse("contains:FAIL"), SuccessCriterion::Contains(_)));
        assert!(matches!(SuccessCriterion::parse("not_contains:FAIL"), SuccessCriterion::NotContains(_)));
    }

    #[test]
    fn criterion_evaluation() {
        assert!(SuccessCriterion::ExitCode0.evaluate(0, ""));
        assert!(!SuccessCriterion::ExitCode0.evaluate(1, ""));
        assert!(SuccessCriterion::Contains("ok".into()).evaluate(1, "all ok here"));
        assert!(SuccessCriterion::NotContains("FAIL".into()).evaluate(0, "all passed"));
        assert!(!SuccessCriterion::NotContains("FAIL".into()).evaluate(1, "1 FAIL"));
    }
}
