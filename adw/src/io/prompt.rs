//! Prompt rendering for the coder and for judgment calls.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::text::truncate_chars;
use crate::core::types::{Evaluation, IterationState};
use crate::io::config::WorkflowConfig;

const RETRY_TEMPLATE: &str = include_str!("prompts/retry.md");
const EVALUATE_TEMPLATE: &str = include_str!("prompts/evaluate.md");
const STRUCTURED_TEMPLATE: &str = include_str!("prompts/structured.md");
const FAILURE_TEMPLATE: &str = include_str!("prompts/failure.md");

/// File path to contents, serialized as a JSON object in evaluator prompts.
pub type FileContents = BTreeMap<String, String>;

/// Everything a judgment prompt needs about the iteration being judged.
#[derive(Debug, Clone, Copy)]
pub struct JudgeContext<'a> {
    pub task: &'a str,
    pub command: &'a str,
    pub output: &'a str,
    pub editable: &'a FileContents,
    pub read_only: &'a FileContents,
    /// 1-based.
    pub iteration: u32,
    pub max_iterations: u32,
}

/// Inputs to the post-mortem prompt.
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    pub workflow: &'a str,
    pub task: &'a str,
    pub command: &'a str,
    pub output: &'a str,
    pub evaluation: Option<&'a Evaluation>,
    pub editable: &'a [PathBuf],
    pub read_only: &'a [PathBuf],
    pub iterations: u32,
    pub max_iterations: u32,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("retry", RETRY_TEMPLATE)
            .context("register retry template")?;
        env.add_template("evaluate", EVALUATE_TEMPLATE)
            .context("register evaluate template")?;
        env.add_template("structured", STRUCTURED_TEMPLATE)
            .context("register structured template")?;
        env.add_template("failure", FAILURE_TEMPLATE)
            .context("register failure template")?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))?;
        Ok(rendered)
    }
}

/// Builds every prompt a run sends out.
pub struct PromptBuilder {
    engine: PromptEngine,
    output_limit_chars: usize,
}

impl PromptBuilder {
    /// `output_limit_chars` bounds how much previous output and feedback a retry
    /// prompt repeats.
    pub fn new(output_limit_chars: usize) -> Result<Self> {
        Ok(Self {
            engine: PromptEngine::new()?,
            output_limit_chars,
        })
    }

    /// Prompt for the coder at `state.iteration`.
    ///
    /// Iteration 0 gets the task verbatim. Later iterations get the task plus the
    /// previous output, its feedback, the attempts left and, on the last one, a
    /// final-attempt clause.
    pub fn coder_prompt(&self, config: &WorkflowConfig, state: &IterationState) -> Result<String> {
        if state.iteration == 0 {
            return Ok(config.prompt.clone());
        }
        let output = truncate_chars(
            state.last_output.as_deref().unwrap_or_default(),
            self.output_limit_chars,
        );
        let feedback = state
            .last_feedback()
            .map(|feedback| truncate_chars(feedback.trim(), self.output_limit_chars))
            .unwrap_or_else(|| "(no feedback recorded)".to_string());
        let remaining = config.max_iterations.saturating_sub(state.iteration);
        let final_attempt = state.iteration + 1 == config.max_iterations;
        debug!(iteration = state.iteration, remaining, final_attempt, "rendering retry prompt");

        self.engine.render(
            "retry",
            context! {
                iteration => state.iteration + 1,
                task => config.prompt.trim(),
                output => output.trim_end(),
                feedback => feedback,
                remaining => remaining,
                command => config.execution_command.as_str(),
                final_attempt => final_attempt,
            },
        )
    }

    /// Prompt for the `default` evaluator, asking for `{success, feedback}`.
    pub fn evaluation_prompt(&self, input: &JudgeContext<'_>) -> Result<String> {
        self.engine.render(
            "evaluate",
            context! {
                task => input.task.trim(),
                command => input.command,
                output => input.output.trim_end(),
                editable => to_json(input.editable)?,
                read_only => to_json(input.read_only)?,
            },
        )
    }

    /// Prompt for the `structured` evaluator, embedding the payload schema.
    pub fn structured_prompt(&self, input: &JudgeContext<'_>, schema: &str) -> Result<String> {
        self.engine.render(
            "structured",
            context! {
                iteration => input.iteration,
                max_iterations => input.max_iterations,
                task => input.task.trim(),
                command => input.command,
                output => input.output.trim_end(),
                editable => to_json(input.editable)?,
                read_only => to_json(input.read_only)?,
                schema => schema.trim(),
            },
        )
    }

    /// Post-mortem prompt, embedding the failure analysis schema.
    pub fn failure_prompt(&self, input: &FailureContext<'_>, schema: &str) -> Result<String> {
        let evaluation = input
            .evaluation
            .map(Evaluation::to_json)
            .unwrap_or_else(|| "No evaluation available".to_string());
        self.engine.render(
            "failure",
            context! {
                workflow => input.workflow,
                iterations => input.iterations,
                max_iterations => input.max_iterations,
                task => input.task.trim(),
                command => input.command,
                output => input.output.trim_end(),
                evaluation => evaluation,
                editable => display_paths(input.editable),
                read_only => display_paths(input.read_only),
                schema => schema.trim(),
            },
        )
    }
}

fn to_json(files: &FileContents) -> Result<String> {
    serde_json::to_string_pretty(files).context("serialize file contents")
}

fn display_paths(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect()
}
