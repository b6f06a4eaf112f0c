//! Judgment capability: send a prompt to a model, get text back.
//!
//! Model ids are routed to a provider by [`ProviderRegistry`]; [`CliJudge`]
//! talks to each provider through its command-line client.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use anyhow::Context;
use tracing::{debug, info, instrument, warn};

use crate::error::JudgeError;
use crate::io::process::{ProcessLimits, run_with_limits};

/// Something that answers a prompt with a model's text response.
pub trait Judge {
    fn judge(&self, model: &str, prompt: &str) -> Result<String, JudgeError>;
}

/// Model providers the registry can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered token rules mapping model ids to providers. First match wins.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    rules: Vec<(String, Provider)>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self {
            rules: vec![
                ("gpt".to_string(), Provider::OpenAi),
                ("claude".to_string(), Provider::Anthropic),
            ],
        }
    }
}

impl ProviderRegistry {
    /// Registry with no rules; every model id is unroutable.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, token: impl Into<String>, provider: Provider) -> Self {
        self.rules.push((token.into().to_ascii_lowercase(), provider));
        self
    }

    /// Case-insensitive substring match against the registered tokens.
    pub fn resolve(&self, model: &str) -> Option<Provider> {
        let model = model.to_ascii_lowercase();
        self.rules
            .iter()
            .find(|(token, _)| model.contains(token.as_str()))
            .map(|(_, provider)| *provider)
    }
}

/// Judge backed by the provider CLIs (`codex` for OpenAI, `claude` for Anthropic).
#[derive(Debug, Clone)]
pub struct CliJudge {
    registry: ProviderRegistry,
    limits: ProcessLimits,
    /// Where `codex exec` writes its final message.
    scratch_dir: PathBuf,
}

impl CliJudge {
    pub fn new(registry: ProviderRegistry, limits: ProcessLimits, scratch_dir: PathBuf) -> Self {
        Self {
            registry,
            limits,
            scratch_dir,
        }
    }

    fn command(&self, provider: Provider, model: &str) -> (Command, Option<PathBuf>) {
        match provider {
            Provider::OpenAi => {
                let output_path = self.scratch_dir.join("judge_last_message.txt");
                let mut cmd = Command::new("codex");
                cmd.arg("exec")
                    .arg("--model")
                    .arg(model)
                    .arg("--skip-git-repo-check")
                    .arg("--output-last-message")
                    .arg(&output_path)
                    .arg("-");
                (cmd, Some(output_path))
            }
            Provider::Anthropic => {
                let mut cmd = Command::new("claude");
                cmd.arg("-p").arg("--model").arg(model);
                (cmd, None)
            }
        }
    }
}

impl Judge for CliJudge {
    #[instrument(skip_all, fields(model = %model, prompt_bytes = prompt.len()))]
    fn judge(&self, model: &str, prompt: &str) -> Result<String, JudgeError> {
        let provider = self
            .registry
            .resolve(model)
            .ok_or_else(|| JudgeError::Unroutable(model.to_string()))?;
        info!(provider = %provider, "requesting judgment");

        let (cmd, output_path) = self.command(provider, model);
        if let Some(path) = &output_path {
            fs::create_dir_all(&self.scratch_dir)
                .with_context(|| format!("create judge scratch dir {}", self.scratch_dir.display()))?;
            // A stale message from an earlier call must never be read back.
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("remove stale judge output {}", path.display()))?;
            }
        }

        let output = run_with_limits(cmd, Some(prompt.as_bytes()), self.limits)
            .with_context(|| format!("run {provider} judge"))?;
        if output.timed_out {
            warn!(timeout_secs = self.limits.timeout.as_secs(), "judge timed out");
            return Err(JudgeError::Timeout {
                provider: provider.as_str(),
                timeout: self.limits.timeout,
            });
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "judge failed");
            return Err(JudgeError::Failed {
                provider: provider.as_str(),
                code: output.status.code(),
                stderr: output.stderr_text(),
            });
        }

        let text = match output_path {
            Some(path) => fs::read_to_string(&path)
                .with_context(|| format!("read judge output {}", path.display()))?,
            None => output.stdout_text(),
        };
        debug!(response_bytes = text.len(), "judgment received");
        Ok(text)
    }
}
