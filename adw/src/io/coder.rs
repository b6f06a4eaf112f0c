//! Coder capability: apply a prompt to the editable files.
//!
//! [`Coder`] decouples the director from the concrete code-editing tool. Tests
//! use scripted coders that record calls without spawning processes.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::error::CoderInvocationError;
use crate::io::process::{ProcessLimits, run_with_limits};

const AIDER_PROGRAM: &str = "aider";
const STDERR_EXCERPT_BYTES: usize = 2_000;

/// One coding pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRequest {
    pub model: String,
    pub prompt: String,
    pub editable: Vec<PathBuf>,
    pub read_only: Vec<PathBuf>,
}

/// Something that edits files on disk in response to a prompt.
pub trait Coder {
    /// Apply `request.prompt` to `request.editable`. Only failures are reported;
    /// edits are observed through the validation command.
    fn code(&self, request: &CodeRequest) -> Result<(), CoderInvocationError>;
}

/// Coder that shells out to the `aider` CLI in non-interactive mode.
#[derive(Debug, Clone)]
pub struct AiderCoder {
    program: String,
    limits: ProcessLimits,
}

impl AiderCoder {
    pub fn new(limits: ProcessLimits) -> Self {
        Self {
            program: AIDER_PROGRAM.to_string(),
            limits,
        }
    }

    /// Use a different executable, e.g. a wrapper script.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// The prompt travels in `message_file`; a retry prompt can outgrow the
    /// per-argument size limit of the OS.
    fn command(&self, request: &CodeRequest, message_file: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--model")
            .arg(&request.model)
            .arg("--yes-always")
            .arg("--no-auto-commits")
            .arg("--no-suggest-shell-commands");
        for path in &request.editable {
            cmd.arg("--file").arg(path);
        }
        for path in &request.read_only {
            cmd.arg("--read").arg(path);
        }
        cmd.arg("--message-file").arg(message_file);
        cmd
    }
}

impl Coder for AiderCoder {
    #[instrument(skip_all, fields(model = %request.model, editable = request.editable.len()))]
    fn code(&self, request: &CodeRequest) -> Result<(), CoderInvocationError> {
        info!(program = %self.program, prompt_bytes = request.prompt.len(), "starting coder");
        let spawn_error = |source| CoderInvocationError::Spawn {
            program: self.program.clone(),
            source,
        };
        let message_file = write_message_file(&request.prompt).map_err(spawn_error)?;
        let output = run_with_limits(self.command(request, message_file.path()), None, self.limits)
            .map_err(spawn_error)?;

        if output.timed_out {
            warn!(timeout_secs = self.limits.timeout.as_secs(), "coder timed out");
            return Err(CoderInvocationError::Timeout(self.limits.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "coder failed");
            let stderr = output.stderr_text();
            return Err(CoderInvocationError::Failed {
                code: output.status.code(),
                stderr: tail(&stderr, STDERR_EXCERPT_BYTES).to_string(),
            });
        }

        debug!(stdout_bytes = output.stdout.len(), "coder completed");
        Ok(())
    }
}

fn write_message_file(prompt: &str) -> anyhow::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("adw-prompt-")
        .suffix(".md")
        .tempfile()
        .context("create prompt file")?;
    file.write_all(prompt.as_bytes()).context("write prompt file")?;
    file.flush().context("flush prompt file")?;
    Ok(file)
}

/// Last `max_bytes` of `text`, cut on a char boundary.
fn tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn request() -> CodeRequest {
        CodeRequest {
            model: "gpt-4o".to_string(),
            prompt: "fix the bug".to_string(),
            editable: vec![PathBuf::from("src/app.py")],
            read_only: vec![PathBuf::from("README.md")],
        }
    }

    fn limits() -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_secs(5),
            output_limit_bytes: 1024,
        }
    }

    #[test]
    fn builds_non_interactive_aider_invocation() {
        let cmd = AiderCoder::new(limits()).command(&request(), Path::new("/tmp/prompt.md"));
        let args: Vec<String> = cmd
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert_eq!(cmd.get_program(), "aider");
        assert_eq!(
            args,
            [
                "--model",
                "gpt-4o",
                "--yes-always",
                "--no-auto-commits",
                "--no-suggest-shell-commands",
                "--file",
                "src/app.py",
                "--read",
                "README.md",
                "--message-file",
                "/tmp/prompt.md",
            ]
        );
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let coder = AiderCoder::new(limits()).with_program("adw-test-no-such-coder");
        let err = coder.code(&request()).unwrap_err();
        assert!(matches!(err, CoderInvocationError::Spawn { .. }));
    }

    #[test]
    fn nonzero_exit_is_failure() {
        let coder = AiderCoder::new(limits()).with_program("false");
        let err = coder.code(&request()).unwrap_err();
        assert!(matches!(err, CoderInvocationError::Failed { code: Some(1), .. }));
    }

    #[test]
    fn long_prompt_is_written_to_message_file() {
        let prompt = "y".repeat(200_000);
        let file = write_message_file(&prompt).expect("message file");
        let written = std::fs::read_to_string(file.path()).expect("read back");
        assert_eq!(written, prompt);
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("aé", 1), "");
    }
}
