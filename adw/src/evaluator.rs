//! Evaluator strategies: turn one iteration's execution output into a verdict.
//!
//! Dispatch is on [`EvaluatorKind`]. `unittest` and `pytest` are pure text rules;
//! `default` and `structured` ask a judge. No strategy returns an error: judge
//! or parse failures become a heuristic verdict (`default`) or a failed verdict
//! with an explanation (`structured`).

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::core::payload::{EvaluationParseError, parse_payload, parse_validated_payload};
use crate::core::types::{Evaluation, EvaluationResult, EvaluatorKind, StructuredEvaluation};
use crate::core::verdict::{heuristic_verdict, pytest_verdict, unittest_verdict};
use crate::error::JudgeError;
use crate::io::command::ExecutionOutput;
use crate::io::config::WorkflowConfig;
use crate::io::judge::Judge;
use crate::io::prompt::{FileContents, JudgeContext, PromptBuilder};
use crate::io::run_log::RunLogger;

pub const STRUCTURED_EVALUATION_SCHEMA: &str =
    include_str!("../schemas/structured_evaluation.schema.json");

/// Judge response expected by the `default` strategy.
#[derive(Debug, Deserialize)]
struct SimpleVerdict {
    success: bool,
    #[serde(default)]
    feedback: String,
}

/// Judge the output of iteration `iteration` (0-based) with the configured strategy.
#[instrument(skip_all, fields(evaluator = config.evaluator.as_str(), iteration = iteration))]
pub fn evaluate<J: Judge + ?Sized>(
    judge: &J,
    prompts: &PromptBuilder,
    config: &WorkflowConfig,
    execution: &ExecutionOutput,
    iteration: u32,
    log: &mut RunLogger,
) -> Evaluation {
    log.event(&format!("Evaluating with '{}' evaluator", config.evaluator.as_str()));
    match config.evaluator {
        EvaluatorKind::Unittest => Evaluation::simple(unittest_verdict(&execution.output)),
        EvaluatorKind::Pytest => Evaluation::simple(pytest_verdict(&execution.output)),
        EvaluatorKind::Default => {
            match judge_simple(judge, prompts, config, execution, iteration, log) {
                Ok(result) => Evaluation::simple(result),
                Err(err) => {
                    info!(err = %err, "default evaluator falling back to heuristic");
                    log.event(&format!(
                        "Evaluator judgment unusable, using heuristic: {err}"
                    ));
                    Evaluation::simple(heuristic_verdict(&execution.output))
                }
            }
        }
        EvaluatorKind::Structured => {
            match judge_structured(judge, prompts, config, execution, iteration, log) {
                Ok(structured) => Evaluation::structured(structured),
                Err(err) => {
                    info!(err = %err, "structured evaluation failed");
                    log.event(&format!("Structured evaluation failed: {err}"));
                    Evaluation::simple(EvaluationResult::failed(format!(
                        "Structured evaluation failed: {err}"
                    )))
                }
            }
        }
    }
}

fn judge_simple<J: Judge + ?Sized>(
    judge: &J,
    prompts: &PromptBuilder,
    config: &WorkflowConfig,
    execution: &ExecutionOutput,
    iteration: u32,
    log: &mut RunLogger,
) -> Result<EvaluationResult, EvaluationParseError> {
    let (editable, read_only) = gather_files(config, log);
    let ctx = judge_context(config, execution, iteration, &editable, &read_only);
    let prompt = prompts.evaluation_prompt(&ctx).map_err(JudgeError::from)?;
    log.detail(&format!("Evaluation prompt:\n{prompt}"));

    let response = judge.judge(&config.evaluator_model, &prompt)?;
    log.detail(&format!("Evaluation response:\n{response}"));
    let verdict: SimpleVerdict = parse_payload(&response)?;
    Ok(EvaluationResult {
        success: verdict.success,
        feedback: verdict.feedback,
    })
}

fn judge_structured<J: Judge + ?Sized>(
    judge: &J,
    prompts: &PromptBuilder,
    config: &WorkflowConfig,
    execution: &ExecutionOutput,
    iteration: u32,
    log: &mut RunLogger,
) -> Result<StructuredEvaluation, EvaluationParseError> {
    let schema: Value = serde_json::from_str(STRUCTURED_EVALUATION_SCHEMA)
        .map_err(|err| EvaluationParseError::InvalidSchema(err.to_string()))?;
    let (editable, read_only) = gather_files(config, log);
    let ctx = judge_context(config, execution, iteration, &editable, &read_only);
    let prompt = prompts
        .structured_prompt(&ctx, STRUCTURED_EVALUATION_SCHEMA)
        .map_err(JudgeError::from)?;
    log.detail(&format!("Structured evaluation prompt:\n{prompt}"));

    let response = judge.judge(&config.evaluator_model, &prompt)?;
    log.detail(&format!("Structured evaluation response:\n{response}"));
    parse_validated_payload(&response, &schema)
}

fn judge_context<'a>(
    config: &'a WorkflowConfig,
    execution: &'a ExecutionOutput,
    iteration: u32,
    editable: &'a FileContents,
    read_only: &'a FileContents,
) -> JudgeContext<'a> {
    JudgeContext {
        task: &config.prompt,
        command: &config.execution_command,
        output: &execution.output,
        editable,
        read_only,
        iteration: iteration + 1,
        max_iterations: config.max_iterations,
    }
}

fn gather_files(config: &WorkflowConfig, log: &mut RunLogger) -> (FileContents, FileContents) {
    (
        read_files(&config.context_editable, log),
        read_files(&config.context_read_only, log),
    )
}

/// Read every regular file; anything unreadable is noted in the run log and skipped.
fn read_files(paths: &[PathBuf], log: &mut RunLogger) -> FileContents {
    let mut contents = FileContents::new();
    for path in paths {
        match fs::read_to_string(path) {
            Ok(text) => {
                contents.insert(path.display().to_string(), text);
            }
            Err(err) => log.detail(&format!("Could not read {}: {err}", path.display())),
        }
    }
    contents
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::io::config::RunSettings;
    use crate::test_support::ScriptedJudge;

    struct Fixture {
        _temp: tempfile::TempDir,
        config: WorkflowConfig,
        log: RunLogger,
        prompts: PromptBuilder,
    }

    fn fixture(evaluator: EvaluatorKind) -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let editable = temp.path().join("app.py");
        fs::write(&editable, "print('hi')\n").expect("write");
        let log = RunLogger::create(&temp.path().join("run.log"), false).expect("log");
        let config = WorkflowConfig {
            name: "demo".to_string(),
            prompt: "Print hi".to_string(),
            coder_model: "gpt-4o".to_string(),
            evaluator_model: "gpt-4o".to_string(),
            max_iterations: 3,
            execution_command: "python app.py".to_string(),
            context_editable: vec![editable],
            context_read_only: vec![temp.path().join("missing.md")],
            evaluator,
            evaluator_tag: evaluator.as_str().to_string(),
            log_file: temp.path().join("run.log"),
            settings: RunSettings::default(),
        };
        Fixture {
            _temp: temp,
            config,
            log,
            prompts: PromptBuilder::new(2000).expect("prompts"),
        }
    }

    fn execution(output: &str) -> ExecutionOutput {
        ExecutionOutput {
            output: output.to_string(),
            exit_code: 0,
            timed_out: false,
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn pytest_strategy_never_calls_judge() {
        let mut fx = fixture(EvaluatorKind::Pytest);
        let judge = ScriptedJudge::new(Vec::new());
        let verdict = evaluate(
            &judge,
            &fx.prompts,
            &fx.config,
            &execution("1 failed, 0 passed"),
            0,
            &mut fx.log,
        );
        assert!(!verdict.success());
        assert_eq!(judge.call_count(), 0);
    }

    #[test]
    fn default_strategy_parses_judge_verdict() {
        let mut fx = fixture(EvaluatorKind::Default);
        let judge = ScriptedJudge::new(vec![Ok(
            "Looks fine.\n```json\n{\"success\": true, \"feedback\": \"done\"}\n```".to_string(),
        )]);
        let verdict = evaluate(&judge, &fx.prompts, &fx.config, &execution("hi"), 0, &mut fx.log);

        assert!(verdict.success());
        assert_eq!(verdict.result.feedback, "done");
        let prompts = judge.prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].0, "gpt-4o");
        assert!(prompts[0].1.contains("print('hi')"));
    }

    #[test]
    fn default_strategy_falls_back_to_heuristic_on_garbage() {
        let mut fx = fixture(EvaluatorKind::Default);
        let judge = ScriptedJudge::new(vec![Ok("I think it works!".to_string())]);
        let verdict = evaluate(&judge, &fx.prompts, &fx.config, &execution("hi"), 0, &mut fx.log);
        assert!(verdict.success());
        assert_eq!(verdict.result.feedback, "Execution completed without obvious errors.");

        let judge = ScriptedJudge::new(vec![Err(JudgeError::Unroutable("llama".to_string()))]);
        let verdict = evaluate(
            &judge,
            &fx.prompts,
            &fx.config,
            &execution("Traceback: Error"),
            0,
            &mut fx.log,
        );
        assert!(!verdict.success());
    }

    #[test]
    fn structured_strategy_projects_rich_verdict() {
        let mut fx = fixture(EvaluatorKind::Structured);
        let judge = ScriptedJudge::new(vec![Ok(r#"```json
{
  "success": false,
  "task_completion": 0.5,
  "security_check": {"passed": true, "issues": [], "risk_level": "low"},
  "changeset": {"changes": [], "summary": "edited app.py"},
  "feedback": "half way",
  "next_steps": ["handle empty input"]
}
```"#
            .to_string())]);
        let verdict = evaluate(&judge, &fx.prompts, &fx.config, &execution("hi"), 1, &mut fx.log);

        assert!(!verdict.success());
        assert!(verdict.structured.is_some());
        assert!(verdict.result.feedback.contains("Task completion: 50.0%"));
        assert!(verdict.result.feedback.contains("handle empty input"));
        assert!(judge.prompts()[0].1.contains("Iteration 2 of 3"));
    }

    #[test]
    fn structured_strategy_rejects_out_of_range_completion() {
        let mut fx = fixture(EvaluatorKind::Structured);
        let judge = ScriptedJudge::new(vec![Ok(
            r#"{"success": true, "task_completion": 1.5}"#.to_string(),
        )]);
        let verdict = evaluate(&judge, &fx.prompts, &fx.config, &execution("ok"), 0, &mut fx.log);

        assert!(!verdict.success());
        assert!(verdict.structured.is_none());
        assert!(verdict.result.feedback.starts_with("Structured evaluation failed"));
    }
}
