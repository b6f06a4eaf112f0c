//! Post-mortem for runs that exhausted their iterations.

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::core::payload::{EvaluationParseError, parse_validated_payload};
use crate::core::report::render_failure_report;
use crate::core::types::{Evaluation, FailureAnalysis};
use crate::error::JudgeError;
use crate::io::config::WorkflowConfig;
use crate::io::judge::Judge;
use crate::io::prompt::{FailureContext, PromptBuilder};
use crate::io::run_log::RunLogger;

pub const FAILURE_ANALYSIS_SCHEMA: &str = include_str!("../schemas/failure_analysis.schema.json");

/// What the analyzer knows about the failed run.
#[derive(Debug, Clone, Copy)]
pub struct FailureInput<'a> {
    pub iterations: u32,
    pub last_output: &'a str,
    pub last_evaluation: Option<&'a Evaluation>,
}

/// Ask the evaluator model why the run failed and report the answer.
///
/// `logs_location` always points at this run's log, whatever the model said.
/// A failed analysis is logged and returns `None`; it never changes the run outcome.
#[instrument(skip_all, fields(workflow = %config.name, iterations = input.iterations))]
pub fn analyze_failure<J: Judge + ?Sized>(
    judge: &J,
    prompts: &PromptBuilder,
    config: &WorkflowConfig,
    input: &FailureInput<'_>,
    log: &mut RunLogger,
) -> Option<FailureAnalysis> {
    log.event("Analyzing failure...");
    match request_analysis(judge, prompts, config, input, log) {
        Ok(mut analysis) => {
            analysis.logs_location = Some(log.path().display().to_string());
            info!(root_causes = analysis.root_causes.len(), "failure analysis complete");
            let report = render_failure_report(&config.name, &analysis);
            log.report(&report);
            Some(analysis)
        }
        Err(err) => {
            warn!(err = %err, "failure analysis unavailable");
            log.event(&format!("Failure analysis unavailable: {err}"));
            None
        }
    }
}

fn request_analysis<J: Judge + ?Sized>(
    judge: &J,
    prompts: &PromptBuilder,
    config: &WorkflowConfig,
    input: &FailureInput<'_>,
    log: &mut RunLogger,
) -> Result<FailureAnalysis, EvaluationParseError> {
    let schema: Value = serde_json::from_str(FAILURE_ANALYSIS_SCHEMA)
        .map_err(|err| EvaluationParseError::InvalidSchema(err.to_string()))?;
    let prompt = prompts
        .failure_prompt(
            &FailureContext {
                workflow: &config.name,
                task: &config.prompt,
                command: &config.execution_command,
                output: input.last_output,
                evaluation: input.last_evaluation,
                editable: &config.context_editable,
                read_only: &config.context_read_only,
                iterations: input.iterations,
                max_iterations: config.max_iterations,
            },
            FAILURE_ANALYSIS_SCHEMA,
        )
        .map_err(JudgeError::from)?;
    log.detail(&format!("Failure analysis prompt:\n{prompt}"));

    let response = judge.judge(&config.evaluator_model, &prompt)?;
    log.detail(&format!("Failure analysis response:\n{response}"));
    parse_validated_payload(&response, &schema)
}
