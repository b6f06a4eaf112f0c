//! Per-run product log.
//!
//! One file per run, truncated at start with a fixed header. Every lifecycle
//! event is appended as a timestamped line; events are also echoed to stdout
//! when echo is on, while details (full prompts, file contents, raw judgments)
//! only go to the file. Separate from `tracing`, which is developer diagnostics.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::warn;

pub const LOG_HEADER: &str = "Director Pattern Log";
const HEADER_RULE_WIDTH: usize = 50;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only, timestamped log for a single run.
pub struct RunLogger {
    path: PathBuf,
    file: File,
    echo: bool,
}

impl RunLogger {
    /// Create (or truncate) the log at `path` and write the header.
    pub fn create(path: &Path, echo: bool) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let mut file =
            File::create(path).with_context(|| format!("create run log {}", path.display()))?;
        writeln!(file, "{LOG_HEADER}\n{}", "=".repeat(HEADER_RULE_WIDTH))
            .with_context(|| format!("write run log header {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            echo,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lifecycle event: file and console.
    pub fn event(&mut self, message: &str) {
        if self.echo {
            println!("{message}");
        }
        self.append(message);
    }

    /// Bulky detail: file only.
    pub fn detail(&mut self, message: &str) {
        self.append(message);
    }

    /// Multi-line report: written verbatim to the console and recorded in the file.
    pub fn report(&mut self, text: &str) {
        if self.echo {
            println!("{text}");
        }
        self.append(text);
    }

    // Losing a log line must not fail the run.
    fn append(&mut self, message: &str) {
        let stamp = Local::now().format(TIMESTAMP_FORMAT);
        if let Err(err) = writeln!(self.file, "[{stamp}] {message}") {
            warn!(path = %self.path.display(), err = %err, "failed to append to run log");
        }
    }
}
