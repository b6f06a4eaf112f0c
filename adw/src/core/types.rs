//! Verdict and diagnosis types shared by evaluators, the director and the
//! failure analyzer.
//!
//! These are plain data: they are produced once (by a judgment call or a
//! heuristic) and never mutated afterwards.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of evaluator strategies, selected by the descriptor's `evaluator` tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorKind {
    /// Judgment call with a token heuristic as fallback.
    #[default]
    Default,
    Unittest,
    Pytest,
    Structured,
}

impl EvaluatorKind {
    /// Exact tag lookup; `None` for anything unrecognized.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "default" => Some(Self::Default),
            "unittest" => Some(Self::Unittest),
            "pytest" => Some(Self::Pytest),
            "structured" => Some(Self::Structured),
            _ => None,
        }
    }

    /// Tag lookup that falls back to [`EvaluatorKind::Default`] for unknown tags.
    ///
    /// Unknown tags are accepted for compatibility with descriptors written for
    /// evaluators this build does not ship.
    pub fn resolve(tag: &str) -> Self {
        Self::from_tag(tag).unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Unittest => "unittest",
            Self::Pytest => "pytest",
            Self::Structured => "structured",
        }
    }
}

/// Minimal verdict every evaluator strategy produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub success: bool,
    pub feedback: String,
}

impl EvaluationResult {
    pub fn passed(feedback: impl Into<String>) -> Self {
        Self {
            success: true,
            feedback: feedback.into(),
        }
    }

    pub fn failed(feedback: impl Into<String>) -> Self {
        Self {
            success: false,
            feedback: feedback.into(),
        }
    }
}

/// `task_completion` fell outside `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("task_completion must be between 0.0 and 1.0, got {0}")]
pub struct CompletionOutOfRange(pub f64);

/// Fraction of the task judged complete, guaranteed to lie in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct TaskCompletion(f64);

impl TaskCompletion {
    pub fn new(value: f64) -> Result<Self, CompletionOutOfRange> {
        if !(0.0..=1.0).contains(&value) {
            return Err(CompletionOutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn percent(self) -> f64 {
        self.0 * 100.0
    }
}

impl TryFrom<f64> for TaskCompletion {
    type Error = CompletionOutOfRange;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskCompletion> for f64 {
    fn from(value: TaskCompletion) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityCheck {
    pub passed: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl Default for SecurityCheck {
    fn default() -> Self {
        Self {
            passed: true,
            issues: Vec::new(),
            risk_level: RiskLevel::Low,
            recommendations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    pub passed: bool,
    pub total_tests: u32,
    pub passed_tests: u32,
    pub failed_tests: u32,
    #[serde(default)]
    pub error_messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
}

/// One file-level modification attributed to an iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub file: String,
    pub change_type: ChangeType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_changed: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default)]
    pub summary: String,
}

/// Rich verdict produced by the `structured` evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredEvaluation {
    pub success: bool,
    pub task_completion: TaskCompletion,
    #[serde(default)]
    pub security_check: SecurityCheck,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<TestResults>,
    #[serde(default)]
    pub changeset: Changeset,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl StructuredEvaluation {
    /// Collapse into the minimal verdict, folding every section into the feedback text.
    pub fn to_result(&self) -> EvaluationResult {
        let mut feedback = format!(
            "Task completion: {:.1}%\n",
            self.task_completion.percent()
        );
        let security = &self.security_check;
        if security.issues.is_empty() {
            feedback.push_str(&format!(
                "Security: {} risk, no issues\n",
                security.risk_level.as_str().to_uppercase()
            ));
        } else {
            feedback.push_str(&format!(
                "Security: {} risk, {} issue(s): {}\n",
                security.risk_level.as_str().to_uppercase(),
                security.issues.len(),
                security.issues.join("; ")
            ));
        }
        if let Some(tests) = &self.test_results {
            feedback.push_str(&format!(
                "Tests: {}/{} passed\n",
                tests.passed_tests, tests.total_tests
            ));
        }
        if !self.changeset.summary.trim().is_empty() {
            feedback.push_str(&format!("Changes: {}\n", self.changeset.summary.trim()));
        }
        if !self.feedback.trim().is_empty() {
            feedback.push_str(&format!("Feedback: {}\n", self.feedback.trim()));
        }
        if !self.next_steps.is_empty() {
            feedback.push_str("Next steps:\n");
            for step in &self.next_steps {
                feedback.push_str(&format!("- {step}\n"));
            }
        }
        EvaluationResult {
            success: self.success,
            feedback: feedback.trim_end().to_string(),
        }
    }
}

/// Verdict for one iteration, keeping the rich form when the strategy produced one.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub result: EvaluationResult,
    pub structured: Option<StructuredEvaluation>,
}

impl Evaluation {
    pub fn simple(result: EvaluationResult) -> Self {
        Self {
            result,
            structured: None,
        }
    }

    pub fn structured(evaluation: StructuredEvaluation) -> Self {
        Self {
            result: evaluation.to_result(),
            structured: Some(evaluation),
        }
    }

    pub fn success(&self) -> bool {
        self.result.success
    }

    /// Pretty JSON of the richest available form, for diagnostic prompts.
    pub fn to_json(&self) -> String {
        let rendered = match &self.structured {
            Some(structured) => serde_json::to_string_pretty(structured),
            None => serde_json::to_string_pretty(&self.result),
        };
        rendered.unwrap_or_else(|err| format!("<unserializable evaluation: {err}>"))
    }
}

/// Post-mortem produced once iterations are exhausted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub root_causes: Vec<String>,
    pub affected_files: Vec<String>,
    pub suggested_fixes: Vec<String>,
    #[serde(default)]
    pub debug_information: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub logs_location: Option<String>,
}

/// What the director carries from one iteration into the next.
#[derive(Debug, Clone, Default)]
pub struct IterationState {
    /// 0-based index of the current iteration.
    pub iteration: u32,
    pub last_output: Option<String>,
    pub last_evaluation: Option<Evaluation>,
}

impl IterationState {
    pub fn last_feedback(&self) -> Option<&str> {
        self.last_evaluation
            .as_ref()
            .map(|evaluation| evaluation.result.feedback.as_str())
    }
}
