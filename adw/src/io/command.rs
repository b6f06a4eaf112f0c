//! The validation command run after every coder pass.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use crate::io::process::{ProcessLimits, run_with_limits, shell_command};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of one validation run. Always present, even when the command could not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Combined stdout+stderr, or an `ERROR:` sentinel.
    pub output: String,
    /// Process exit code; `-1` for timeouts and failures to run.
    pub exit_code: i32,
    pub timed_out: bool,
    pub duration: Duration,
}

impl ExecutionOutput {
    pub fn is_error_sentinel(&self) -> bool {
        self.output.starts_with("ERROR:")
    }
}

/// Run `command` through the shell within `limits`.
///
/// Total: timeouts and spawn/wait failures come back as `ERROR:` text so the
/// evaluator always has something to judge.
#[instrument(skip_all, fields(command = %command))]
pub fn execute(command: &str, limits: ProcessLimits) -> ExecutionOutput {
    let started = Instant::now();
    match run_with_limits(shell_command(command), None, limits) {
        Ok(captured) if captured.timed_out => {
            warn!(timeout_secs = limits.timeout.as_secs(), "validation command timed out");
            ExecutionOutput {
                output: format!(
                    "ERROR: Execution timed out after {} seconds",
                    limits.timeout.as_secs()
                ),
                exit_code: -1,
                timed_out: true,
                duration: started.elapsed(),
            }
        }
        Ok(captured) => {
            info!(exit_code = captured.exit_code(), "validation command finished");
            ExecutionOutput {
                output: captured.combined_text(),
                exit_code: captured.exit_code(),
                timed_out: false,
                duration: started.elapsed(),
            }
        }
        Err(err) => {
            warn!(err = %err, "validation command could not run");
            ExecutionOutput {
                output: format!("ERROR: {err:#}"),
                exit_code: -1,
                timed_out: false,
                duration: started.elapsed(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(secs: u64) -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_secs(secs),
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn returns_combined_output_and_exit_code() {
        let out = execute("echo '1 failed, 0 passed'; exit 1", limits(5));
        assert_eq!(out.output.trim(), "1 failed, 0 passed");
        assert_eq!(out.exit_code, 1);
        assert!(!out.is_error_sentinel());
    }

    #[test]
    fn timeout_becomes_error_sentinel() {
        let out = execute("sleep 3", limits(1));
        assert!(out.output.starts_with("ERROR:"), "got {:?}", out.output);
        assert!(out.output.contains("timed out"));
        assert!(out.timed_out);
        assert_eq!(out.exit_code, -1);
    }

    #[cfg(unix)]
    #[test]
    fn timeout_bounds_compound_commands() {
        let out = execute("cd /tmp && sleep 8", limits(1));
        assert!(out.timed_out);
        assert!(out.duration < Duration::from_secs(4), "took {:?}", out.duration);
    }

    #[test]
    fn nonzero_exit_is_not_an_error_sentinel() {
        let out = execute("exit 7", limits(5));
        assert_eq!(out.exit_code, 7);
        assert!(!out.timed_out);
        assert!(!out.is_error_sentinel());
    }
}
