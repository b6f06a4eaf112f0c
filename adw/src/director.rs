//! The bounded closed loop: code, validate, evaluate, retry or stop.
//!
//! ```text
//! Idle -> Iterating(0) -> ... -> Iterating(N-1)
//!           |  success               |  failure
//!           v                        v
//!       Succeeded                Exhausted -> failure analysis
//! ```
//!
//! A coder failure stops the run as failed under the default `abort` policy and
//! skips failure analysis. Judgment problems never stop the loop; they only
//! shape the verdict of the iteration they happen in.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::analysis::{FailureInput, analyze_failure};
use crate::core::types::{FailureAnalysis, IterationState};
use crate::evaluator::evaluate;
use crate::io::coder::{CodeRequest, Coder};
use crate::io::command::execute;
use crate::io::config::{CoderErrorPolicy, WorkflowConfig};
use crate::io::judge::Judge;
use crate::io::prompt::PromptBuilder;
use crate::io::run_log::RunLogger;

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStop {
    /// An evaluation passed at this 1-based iteration.
    Succeeded { iteration: u32 },
    /// Every iteration ran and none passed.
    Exhausted,
    /// The coder raised and the policy was `abort`.
    CoderFailed { iteration: u32, error: String },
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub success: bool,
    /// Iterations started, including one cut short by a coder failure.
    pub iterations: u32,
    pub stop: RunStop,
    /// Present only after exhaustion, and only when the analysis itself worked.
    pub failure_analysis: Option<FailureAnalysis>,
}

/// Drives one workflow with a coder and a judge.
pub struct Director<C, J> {
    config: WorkflowConfig,
    coder: C,
    judge: J,
    prompts: PromptBuilder,
    echo: bool,
}

impl<C: Coder, J: Judge> Director<C, J> {
    pub fn new(config: WorkflowConfig, coder: C, judge: J) -> Result<Self> {
        let prompts = PromptBuilder::new(config.settings.prompt_output_limit_chars)?;
        Ok(Self {
            config,
            coder,
            judge,
            prompts,
            echo: true,
        })
    }

    /// Echo lifecycle events to stdout (on by default).
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn coder(&self) -> &C {
        &self.coder
    }

    pub fn judge(&self) -> &J {
        &self.judge
    }

    /// Run to completion. Errors only when the run log or a prompt cannot be produced.
    #[instrument(skip_all, fields(workflow = %self.config.name, max_iterations = self.config.max_iterations))]
    pub fn run(&self) -> Result<RunOutcome> {
        let config = &self.config;
        let mut log = RunLogger::create(&config.log_file, self.echo)?;
        log.event(&format!("Starting workflow '{}'", config.name));
        log.detail(&format!(
            "Coder model: {}\nEvaluator model: {}\nEvaluator: {}\nExecution command: {}\nMax iterations: {}",
            config.coder_model,
            config.evaluator_model,
            config.evaluator.as_str(),
            config.execution_command,
            config.max_iterations
        ));
        if config.evaluator_fell_back() {
            warn!(tag = %config.evaluator_tag, "unknown evaluator, using default");
            log.event(&format!(
                "Unknown evaluator '{}', using '{}'",
                config.evaluator_tag,
                config.evaluator.as_str()
            ));
        }

        let mut state = IterationState::default();
        for iteration in 0..config.max_iterations {
            state.iteration = iteration;
            let attempt = iteration + 1;
            info!(iteration = attempt, "iteration started");
            log.event(&format!(
                "=== Iteration {attempt}/{} ===",
                config.max_iterations
            ));

            let prompt = self.prompts.coder_prompt(config, &state)?;
            log.detail(&format!("Coder prompt:\n{prompt}"));
            let request = CodeRequest {
                model: config.coder_model.clone(),
                prompt,
                editable: config.context_editable.clone(),
                read_only: config.context_read_only.clone(),
            };
            if let Err(err) = self.coder.code(&request) {
                warn!(err = %err, "coder failed");
                log.event(&format!("Coder failed: {err}"));
                if config.settings.on_coder_error == CoderErrorPolicy::Abort {
                    log.event("Aborting run after coder failure");
                    return Ok(RunOutcome {
                        success: false,
                        iterations: attempt,
                        stop: RunStop::CoderFailed {
                            iteration: attempt,
                            error: err.to_string(),
                        },
                        failure_analysis: None,
                    });
                }
                log.event("Continuing to validation despite coder failure");
            } else {
                log.event("Coder pass complete");
            }

            log.event(&format!("Running: {}", config.execution_command));
            let execution = execute(&config.execution_command, config.settings.command_limits());
            log.event(&format!(
                "Command finished with exit code {} in {:.1}s{}",
                execution.exit_code,
                execution.duration.as_secs_f64(),
                if execution.timed_out { " (timed out)" } else { "" }
            ));
            if execution.is_error_sentinel() {
                log.event("Validation command did not complete");
            }
            log.detail(&format!("Execution output:\n{}", execution.output));

            let evaluation = evaluate(
                &self.judge,
                &self.prompts,
                config,
                &execution,
                iteration,
                &mut log,
            );
            log.event(&format!(
                "Evaluation: {}",
                if evaluation.success() { "success" } else { "failure" }
            ));
            log.detail(&format!("Feedback:\n{}", evaluation.result.feedback));

            if evaluation.success() {
                info!(iteration = attempt, "workflow succeeded");
                log.event(&format!(
                    "Workflow completed successfully after {attempt} iteration(s)"
                ));
                return Ok(RunOutcome {
                    success: true,
                    iterations: attempt,
                    stop: RunStop::Succeeded { iteration: attempt },
                    failure_analysis: None,
                });
            }

            state.last_output = Some(execution.output);
            state.last_evaluation = Some(evaluation);
        }

        info!("iterations exhausted");
        log.event(&format!(
            "Workflow failed: no success after {} iteration(s)",
            config.max_iterations
        ));
        let failure_analysis = match &state.last_evaluation {
            Some(evaluation) => analyze_failure(
                &self.judge,
                &self.prompts,
                config,
                &FailureInput {
                    iterations: config.max_iterations,
                    last_output: state.last_output.as_deref().unwrap_or_default(),
                    last_evaluation: Some(evaluation),
                },
                &mut log,
            ),
            None => None,
        };

        Ok(RunOutcome {
            success: false,
            iterations: config.max_iterations,
            stop: RunStop::Exhausted,
            failure_analysis,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::types::EvaluatorKind;
    use crate::test_support::{ScriptedCoder, ScriptedJudge, WorkflowFixture, verdict};

    #[test]
    fn retry_prompt_reaches_coder_on_second_iteration() {
        let fixture = WorkflowFixture::new("echo ok").expect("fixture");
        let config = fixture.config(EvaluatorKind::Default, 3);
        let judge = ScriptedJudge::new(vec![
            Ok(verdict(false, "needs a docstring")),
            Ok(verdict(true, "good")),
        ]);
        let director = Director::new(config, ScriptedCoder::new(), judge)
            .expect("director")
            .with_echo(false);

        let outcome = director.run().expect("run");

        assert!(outcome.success);
        assert_eq!(outcome.stop, RunStop::Succeeded { iteration: 2 });
        let requests = director.coder().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].prompt, fixture.prompt());
        assert!(requests[1].prompt.contains("needs a docstring"));
        assert!(!requests[1].prompt.contains("FINAL ATTEMPT"));
    }

    #[test]
    fn run_log_records_lifecycle() {
        let fixture = WorkflowFixture::new("echo ok").expect("fixture");
        let config = fixture.config(EvaluatorKind::Unittest, 1);
        let log_file = config.log_file.clone();
        let director = Director::new(config, ScriptedCoder::new(), ScriptedJudge::new(Vec::new()))
            .expect("director")
            .with_echo(false);

        let outcome = director.run().expect("run");
        assert!(!outcome.success);

        let logged = fs::read_to_string(log_file).expect("read log");
        assert!(logged.starts_with("Director Pattern Log\n"));
        assert!(logged.contains("=== Iteration 1/1 ==="));
        assert!(logged.contains("Evaluation: failure"));
        assert!(logged.contains("Workflow failed"));
    }

    #[test]
    fn unknown_evaluator_tag_is_reported_once() {
        let fixture = WorkflowFixture::new("echo OK").expect("fixture");
        let mut config = fixture.config(EvaluatorKind::Unittest, 2);
        config.evaluator = EvaluatorKind::Default;
        config.evaluator_tag = "mystery".to_string();
        let log_file = config.log_file.clone();
        let judge = ScriptedJudge::new(vec![Ok(verdict(true, "fine"))]);
        let director = Director::new(config, ScriptedCoder::new(), judge)
            .expect("director")
            .with_echo(false);

        director.run().expect("run");

        let logged = fs::read_to_string(log_file).expect("read log");
        assert_eq!(logged.matches("Unknown evaluator 'mystery'").count(), 1);
    }

    #[test]
    fn timed_out_command_is_noted_in_run_log() {
        let fixture = WorkflowFixture::new("sleep 5").expect("fixture");
        let mut config = fixture.config(EvaluatorKind::Pytest, 1);
        config.settings.command_timeout_secs = 1;
        let log_file = config.log_file.clone();
        let director = Director::new(config, ScriptedCoder::new(), ScriptedJudge::new(Vec::new()))
            .expect("director")
            .with_echo(false);

        let outcome = director.run().expect("run");

        assert!(!outcome.success);
        let logged = fs::read_to_string(log_file).expect("read log");
        assert!(logged.contains("(timed out)"));
        assert!(logged.contains("Validation command did not complete"));
    }
}
