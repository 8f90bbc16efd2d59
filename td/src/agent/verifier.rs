//! Verifier (§4.8): executes a project's verification steps against its
//! workspace and decides whether the project is `Completed` or needs fix
//! tasks and another pass through `InProgress`.

use std::path::Path;
use std::time::Duration;

use taskstore::now_ms;
use tracing::warn;

use crate::domain::{CheckType, Priority, SuccessCriterion, Task, VerificationCheck, VerificationState, VerificationStatus, VerificationStep, WyrmRecommendation};

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(600);
const TIMEOUT_MARKER: &str = "[verification step timed out]";
const TRUNCATED_OUTPUT_CHARS: usize = 500;

pub struct VerificationOutcome {
    pub state: VerificationState,
    pub passed: bool,
    /// Present iff verification failed and fix tasks should be materialized.
    pub fix_tasks: Option<Vec<Task>>,
}

/// Runs every step in `workspace`, in order, honoring a per-step timeout.
pub async fn run_verification(
    workspace: &Path,
    recommendation: Option<&WyrmRecommendation>,
    require_all_checks_passing: bool,
    spec_version_id: &str,
    step_timeout: Duration,
) -> VerificationOutcome {
    let steps = determine_steps(workspace, recommendation);
    let mut checks = Vec::with_capacity(steps.len());

    for step in &steps {
        checks.push(run_step(workspace, step, step_timeout).await);
    }

    let passed = evaluate_checks(&checks, require_all_checks_passing);
    let report = render_report(&checks, passed);

    let state = VerificationState {
        status: if passed { VerificationStatus::Passed } else { VerificationStatus::Failed },
        started_at: Some(now_ms()),
        completed_at: Some(now_ms()),
        report: Some(report),
        checks: checks.clone(),
    };

    let fix_tasks = if passed { None } else { Some(build_fix_tasks(&checks, spec_version_id)) };

    VerificationOutcome { state, passed, fix_tasks }
}

/// Skips execution entirely; used for imported projects when
/// `SkipForImportedProjects` is set.
pub fn skipped_verification() -> VerificationState {
    VerificationState { status: VerificationStatus::Skipped, started_at: Some(now_ms()), completed_at: Some(now_ms()), report: None, checks: Vec::new() }
}

fn determine_steps(workspace: &Path, recommendation: Option<&WyrmRecommendation>) -> Vec<VerificationStep> {
    if let Some(rec) = recommendation
        && !rec.verification_steps.is_empty()
    {
        return rec.verification_steps.clone();
    }
    auto_detect_steps(workspace)
}

/// Falls back to the standard commands for a handful of common project
/// manifests when Wyrm didn't recommend anything.
fn auto_detect_steps(workspace: &Path) -> Vec<VerificationStep> {
    let mut steps = Vec::new();
    if workspace.join("Cargo.toml").is_file() {
        steps.push(VerificationStep { check_type: CheckType::Build, command: "cargo build".to_string(), priority: Priority::Critical, success_criterion: "exit_code_0".to_string() });
        steps.push(VerificationStep { check_type: CheckType::Test, command: "cargo test".to_string(), priority: Priority::High, success_criterion: "exit_code_0".to_string() });
    }
    if workspace.join("package.json").is_file() {
        steps.push(VerificationStep { check_type: CheckType::Build, command: "npm run build".to_string(), priority: Priority::Critical, success_criterion: "exit_code_0".to_string() });
        steps.push(VerificationStep { check_type: CheckType::Test, command: "npm test".to_string(), priority: Priority::High, success_criterion: "exit_code_0".to_string() });
    }
    if workspace.join("pyproject.toml").is_file() || workspace.join("setup.py").is_file() {
        steps.push(VerificationStep { check_type: CheckType::Test, command: "pytest".to_string(), priority: Priority::High, success_criterion: "exit_code_0".to_string() });
    }
    if steps.is_empty() {
        warn!("verifier: no known project manifest found, no steps to auto-detect");
    }
    steps
}

async fn run_step(workspace: &Path, step: &VerificationStep, timeout: Duration) -> VerificationCheck {
    let started = std::time::Instant::now();
    let executed_at = now_ms();

    let output = tokio::time::timeout(timeout, tokio::process::Command::new("sh").arg("-c").arg(&step.command).current_dir(workspace).output()).await;

    let duration_seconds = started.elapsed().as_secs_f64();

    match output {
        Ok(Ok(output)) => {
            let combined = format!("{}{}", String::from_utf8_lossy(&output.stdout), String::from_utf8_lossy(&output.stderr));
            let exit_code = output.status.code().unwrap_or(-1);
            let criterion = SuccessCriterion::parse(&step.success_criterion);
            let passed = criterion.evaluate(exit_code, &combined);
            VerificationCheck {
                check_type: step.check_type,
                command: step.command.clone(),
                priority: step.priority,
                exit_code: Some(exit_code),
                output: combined,
                duration_seconds,
                executed_at,
                passed,
                timed_out: false,
            }
        }
        Ok(Err(e)) => VerificationCheck {
            check_type: step.check_type,
            command: step.command.clone(),
            priority: step.priority,
            exit_code: None,
            output: format!("failed to execute: {e}"),
            duration_seconds,
            executed_at,
            passed: false,
            timed_out: false,
        },
        Err(_) => VerificationCheck {
            check_type: step.check_type,
            command: step.command.clone(),
            priority: step.priority,
            exit_code: None,
            output: TIMEOUT_MARKER.to_string(),
            duration_seconds,
            executed_at,
            passed: false,
            timed_out: true,
        },
    }
}

fn evaluate_checks(checks: &[VerificationCheck], require_all_checks_passing: bool) -> bool {
    if require_all_checks_passing {
        checks.iter().all(|c| c.passed)
    } else {
        !checks.iter().any(|c| !c.passed && c.priority == Priority::Critical)
    }
}

fn build_fix_tasks(checks: &[VerificationCheck], spec_version_id: &str) -> Vec<Task> {
    checks
        .iter()
        .filter(|c| !c.passed)
        .enumerate()
        .map(|(index, check)| {
            let truncated: String = check.output.chars().take(TRUNCATED_OUTPUT_CHARS).collect();
            let description = format!("Fix failing {} check: `{}`\n\nOutput:\n{}", check.check_type, check.command, truncated);
            let id = crate::domain::short_slug(&["verification-fix", &index.to_string(), &check.command]);
            let mut task = Task::new(id, description, spec_version_id);
            task.priority = check.priority;
            task
        })
        .collect()
}

fn render_report(checks: &[VerificationCheck], passed: bool) -> String {
    let mut out = format!("# Verification report\n\nOverall: {}\n\n", if passed { "PASSED" } else { "FAILED" });
    for check in checks {
        out.push_str(&format!(
            "## {} - {}\n\nCommand: `{}`\nExit code: {:?}\nDuration: {:.2}s\nTimed out: {}\n\n```\n{}\n```\n\n",
            check.check_type,
            if check.passed { "passed" } else { "failed" },
            check.command,
            check.exit_code,
            check.duration_seconds,
            check.timed_out,
            check.output,
        ));
    }
    out
}

pub fn default_step_timeout() -> Duration {
    DEFAULT_STEP_TIMEOUT
}
