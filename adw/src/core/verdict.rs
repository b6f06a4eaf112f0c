//! Token-based verdicts over raw execution output.
//!
//! Used directly by the `unittest` and `pytest` strategies and as the fallback
//! of the `default` strategy when the judgment call cannot be used.

use crate::core::types::EvaluationResult;

/// Verdict for Python `unittest`-style output.
///
/// Tokens are matched case-sensitively, as the runner prints them. `FAILED` or
/// `ERROR` always fail; otherwise `OK` passes; no token at all is undetermined.
pub fn unittest_verdict(output: &str) -> EvaluationResult {
    if output.contains("FAILED") || output.contains("ERROR") {
        return tests_failed(output);
    }
    if output.contains("OK") {
        return all_passed();
    }
    undetermined(output)
}

/// Verdict for `pytest`-style summaries.
///
/// Case-insensitive. Any `failed` forces failure even when `passed` also
/// appears; `passed` alone succeeds; neither is undetermined.
pub fn pytest_verdict(output: &str) -> EvaluationResult {
    let lowered = output.to_lowercase();
    if lowered.contains("failed") {
        return tests_failed(output);
    }
    if lowered.contains("passed") {
        return all_passed();
    }
    undetermined(output)
}

/// Last-resort verdict: success unless the output mentions `error` or `fail`.
pub fn heuristic_verdict(output: &str) -> EvaluationResult {
    let lowered = output.to_lowercase();
    if lowered.contains("error") || lowered.contains("fail") {
        return EvaluationResult::failed(format!("Execution failed with errors: {output}"));
    }
    EvaluationResult::passed("Execution completed without obvious errors.")
}

fn all_passed() -> EvaluationResult {
    EvaluationResult::passed("All tests passed successfully.")
}

fn tests_failed(output: &str) -> EvaluationResult {
    EvaluationResult::failed(format!(
        "Tests failed. Please fix the following issues:\n{output}"
    ))
}

fn undetermined(output: &str) -> EvaluationResult {
    EvaluationResult::failed(format!(
        "Unable to determine test results. Output:\n{output}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unittest_ok_passes() {
        let output = "....\n------------------------------\nRan 4 tests in 0.002s\n\nOK";
        assert!(unittest_verdict(output).success);
    }

    #[test]
    fn unittest_failed_wins_over_ok() {
        let result = unittest_verdict("OK so far\nFAILED (failures=1)");
        assert!(!result.success);
        assert!(result.feedback.starts_with("Tests failed"));
    }

    #[test]
    fn unittest_error_fails() {
        assert!(!unittest_verdict("ERROR: test_load (test_app.TestApp)").success);
    }

    #[test]
    fn unittest_without_tokens_is_undetermined() {
        let result = unittest_verdict("nothing ran");
        assert!(!result.success);
        assert!(result.feedback.starts_with("Unable to determine"));
    }

    #[test]
    fn unittest_tokens_are_case_sensitive() {
        // lowercase "ok" is not the runner's summary token
        assert!(!unittest_verdict("looks ok").success);
    }

    #[test]
    fn pytest_failed_takes_precedence() {
        let result = pytest_verdict("3 passed, 1 failed in 0.12s");
        assert!(!result.success);
    }

    #[test]
    fn pytest_passed_alone_succeeds() {
        assert!(pytest_verdict("===== 5 passed in 0.03s =====").success);
    }

    #[test]
    fn pytest_is_case_insensitive() {
        assert!(!pytest_verdict("1 FAILED").success);
        assert!(pytest_verdict("2 PASSED").success);
    }

    #[test]
    fn pytest_without_tokens_is_undetermined() {
        let result = pytest_verdict("collected 0 items");
        assert!(!result.success);
        assert!(result.feedback.starts_with("Unable to determine"));
    }

    #[test]
    fn heuristic_flags_error_and_fail() {
        assert!(!heuristic_verdict("Traceback: ValueError").success);
        assert!(!heuristic_verdict("build FAILURE").success);
        assert!(heuristic_verdict("all good").success);
    }
}
